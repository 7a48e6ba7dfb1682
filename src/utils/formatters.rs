use chrono::{DateTime, Local};

/// Make free text safe to use as part of a file name.
///
/// Keeps ASCII alphanumerics, `-` and `_`, turns everything else into `_`,
/// collapses runs, and caps the length.
pub fn sanitize_filename(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_len));
    for c in text.trim().chars() {
        let mapped = if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
        if out.len() >= max_len {
            break;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `YYYYmmdd-HHMMSS`, used in generated file names.
pub fn file_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}
