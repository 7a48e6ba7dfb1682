//! Reading user-supplied context: typed lines, text files and images.

use base64::Engine as _;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::message::ImageAttachment;

/// A text file whose contents are placed in the system prompt.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Attachment {
    pub path: String,
    pub content: String,
}

#[derive(Debug)]
pub enum AttachmentError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    UnsupportedImage {
        path: PathBuf,
    },
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::Read { path, source } => {
                write!(f, "Could not read {}: {}", path.display(), source)
            }
            AttachmentError::UnsupportedImage { path } => write!(
                f,
                "Unsupported image type for {} (expected png, jpg, jpeg, gif or webp)",
                path.display()
            ),
        }
    }
}

impl std::error::Error for AttachmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttachmentError::Read { source, .. } => Some(source),
            AttachmentError::UnsupportedImage { .. } => None,
        }
    }
}

/// Replace tabs with spaces and drop control characters other than newlines.
pub fn sanitize_text_input(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\t' => sanitized.push_str("    "),
            '\r' => {}
            '\n' => sanitized.push(c),
            _ if !c.is_control() => sanitized.push(c),
            _ => {}
        }
    }
    sanitized
}

pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

pub fn load_attachment(path: &Path) -> Result<Attachment, AttachmentError> {
    let content = std::fs::read_to_string(path).map_err(|source| AttachmentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Attachment {
        path: path.display().to_string(),
        content,
    })
}

pub fn load_image(path: &Path) -> Result<ImageAttachment, AttachmentError> {
    let mime_type = image_mime_type(path).ok_or_else(|| AttachmentError::UnsupportedImage {
        path: path.to_path_buf(),
    })?;
    let bytes = std::fs::read(path).map_err(|source| AttachmentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ImageAttachment {
        mime_type: mime_type.to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}
