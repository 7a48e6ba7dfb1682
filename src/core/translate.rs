//! Conversions between the providers' message schemas.
//!
//! History is stored in whichever shape the active provider expects. These
//! helpers build turns for a given provider, pull plain text back out, and
//! rewrite a whole history for a different target. In multichat histories,
//! replies tagged with another provider's `source_engine` are handed to the
//! target as labeled user turns so a model never mistakes the other model's
//! words for its own.

use regex::RegexBuilder;

use crate::core::message::{
    ContentPart, GeminiPart, ImageAttachment, ImageUrl, InlineData, OpenAiContent, Role, Turn,
};
use crate::core::provider::Provider;

pub fn construct_user_message(provider: Provider, text: &str, images: &[ImageAttachment]) -> Turn {
    match provider {
        Provider::OpenAi => {
            let mut content = vec![ContentPart::Text {
                text: text.to_string(),
            }];
            content.extend(images.iter().map(|image| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            }));
            Turn::OpenAi {
                role: Role::User,
                content: OpenAiContent::Parts(content),
                source_engine: None,
            }
        }
        Provider::Gemini => {
            let mut parts = vec![GeminiPart::Text {
                text: text.to_string(),
            }];
            parts.extend(images.iter().map(|image| GeminiPart::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                },
            }));
            Turn::Gemini {
                role: Role::User,
                parts,
                source_engine: None,
            }
        }
    }
}

pub fn construct_assistant_message(provider: Provider, text: &str) -> Turn {
    match provider {
        Provider::OpenAi => Turn::OpenAi {
            role: Role::Assistant,
            content: OpenAiContent::Text(text.to_string()),
            source_engine: None,
        },
        Provider::Gemini => Turn::Gemini {
            role: Role::Model,
            parts: vec![GeminiPart::Text {
                text: text.to_string(),
            }],
            source_engine: None,
        },
    }
}

pub fn extract_text(turn: &Turn) -> &str {
    turn.text()
}

/// Rewrite `history` into `target`'s schema.
///
/// User turns keep only their text. Untagged assistant turns become the
/// target's assistant shape. Tagged assistant turns stay assistant turns only
/// when the tag names the target; otherwise they become user turns prefixed
/// with `[<Other>'s Response]: `. System turns are dropped since the system
/// prompt travels separately, and turns with an unrecognized role are
/// dropped too.
pub fn translate_history(history: &[Turn], target: Provider) -> Vec<Turn> {
    history
        .iter()
        .filter_map(|turn| {
            let text = turn.text();
            match turn.role() {
                Role::System | Role::Unknown => None,
                Role::User => Some(construct_user_message(target, text, &[])),
                Role::Assistant | Role::Model => match turn.source_engine() {
                    Some(source) if source != target => {
                        let labeled = format!("[{}'s Response]: {}", source.label(), text);
                        Some(construct_user_message(target, &labeled, &[]))
                    }
                    _ => Some(construct_assistant_message(target, text)),
                },
            }
        })
        .collect()
}

/// Strip a leading self-label such as `[Gemini]:` that a model sometimes
/// prepends in multichat even though the client adds its own label.
pub fn clean_response_text(provider: Provider, text: &str) -> String {
    let trimmed = text.trim_start();
    let pattern = format!(r"^\s*\[{}\]\s*:?\s*", regex::escape(provider.label()));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.replace(trimmed, "").into_owned(),
        Err(_) => trimmed.to_string(),
    }
}
