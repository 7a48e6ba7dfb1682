//! Scrubbing of credentials from values before they are logged.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static URL_KEY_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"key=([^&]+)").expect("valid key parameter pattern"));
static OPENAI_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sk-(proj-)?\w{20,}").expect("valid OpenAI key pattern"));
static GEMINI_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AIzaSy[A-Za-z0-9\-_]{20,}").expect("valid Gemini key pattern"));

/// Object keys whose values are always replaced, compared case-insensitively.
const SENSITIVE_KEYS: [&str; 4] = ["api_key", "key", "token", "authorization"];

/// Return a redacted copy of `value`; the input is left untouched.
///
/// Values under sensitive keys become `[REDACTED]` (an `Authorization`
/// header becomes `Bearer [REDACTED]`). Every string anywhere in the tree has
/// `key=` URL parameters and recognizable OpenAI/Gemini keys replaced. All
/// other content is returned unchanged.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::with_capacity(map.len());
            for (key, inner) in map {
                let replacement = if is_sensitive_key(key) {
                    if key == "Authorization" {
                        Value::String("Bearer [REDACTED]".to_string())
                    } else {
                        Value::String("[REDACTED]".to_string())
                    }
                } else {
                    redact_value(inner)
                };
                redacted.insert(key.clone(), replacement);
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::String(text) => Value::String(redact_str(text)),
        other => other.clone(),
    }
}

pub fn redact_str(text: &str) -> String {
    let text = URL_KEY_PARAM.replace_all(text, "key=[REDACTED]");
    let text = OPENAI_KEY.replace_all(&text, "[REDACTED_OPENAI_KEY]");
    GEMINI_KEY
        .replace_all(&text, "[REDACTED_GEMINI_KEY]")
        .into_owned()
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| key.eq_ignore_ascii_case(sensitive))
}
