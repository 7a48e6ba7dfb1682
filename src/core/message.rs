use serde::{Deserialize, Serialize};

use crate::core::provider::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Model,
    System,
    /// Any other role, such as OpenAI's `tool`. Kept so a saved history
    /// containing one still loads; never sent to a provider.
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Model => "model",
            Role::System => "system",
            Role::Unknown => "unknown",
        }
    }

    /// `assistant` and `model` are the same speaker under two providers' names.
    pub fn is_assistant(self) -> bool {
        matches!(self, Role::Assistant | Role::Model)
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }
}

/// A base64-encoded image ready to be embedded in a user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: String,
}

impl ImageAttachment {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One element of an OpenAI `content` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// One element of a Gemini `parts` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

/// A single record of conversation history, kept in the shape of the
/// provider it was built for.
///
/// The serialized form is exactly the provider's own message object. The
/// optional `source_engine` tag only appears in multichat histories, where it
/// records which provider produced an assistant turn. It is stripped before a
/// turn is sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Turn {
    OpenAi {
        role: Role,
        content: OpenAiContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_engine: Option<Provider>,
    },
    Gemini {
        role: Role,
        parts: Vec<GeminiPart>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_engine: Option<Provider>,
    },
    /// Flat `{role, text}` records written by older transcript versions.
    Bare {
        role: Role,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_engine: Option<Provider>,
    },
}

impl Turn {
    pub fn role(&self) -> Role {
        match self {
            Turn::OpenAi { role, .. } | Turn::Gemini { role, .. } | Turn::Bare { role, .. } => {
                *role
            }
        }
    }

    pub fn source_engine(&self) -> Option<Provider> {
        match self {
            Turn::OpenAi { source_engine, .. }
            | Turn::Gemini { source_engine, .. }
            | Turn::Bare { source_engine, .. } => *source_engine,
        }
    }

    pub fn with_source(mut self, provider: Provider) -> Self {
        match &mut self {
            Turn::OpenAi { source_engine, .. }
            | Turn::Gemini { source_engine, .. }
            | Turn::Bare { source_engine, .. } => *source_engine = Some(provider),
        }
        self
    }

    /// Copy of this turn without the multichat source tag, as sent to an API.
    pub fn to_wire(&self) -> Turn {
        let mut turn = self.clone();
        match &mut turn {
            Turn::OpenAi { source_engine, .. }
            | Turn::Gemini { source_engine, .. }
            | Turn::Bare { source_engine, .. } => *source_engine = None,
        }
        turn
    }

    /// The first textual part of the turn, or an empty string.
    pub fn text(&self) -> &str {
        match self {
            Turn::OpenAi {
                content: OpenAiContent::Text(text),
                ..
            } => text,
            Turn::OpenAi {
                content: OpenAiContent::Parts(parts),
                ..
            } => parts
                .iter()
                .find_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .unwrap_or(""),
            Turn::Gemini { parts, .. } => parts
                .iter()
                .find_map(|part| match part {
                    GeminiPart::Text { text } => Some(text.as_str()),
                    GeminiPart::InlineData { .. } => None,
                })
                .unwrap_or(""),
            Turn::Bare { text, .. } => text,
        }
    }

    /// Number of inline images carried by the turn.
    pub fn image_count(&self) -> usize {
        match self {
            Turn::OpenAi {
                content: OpenAiContent::Parts(parts),
                ..
            } => parts
                .iter()
                .filter(|part| matches!(part, ContentPart::ImageUrl { .. }))
                .count(),
            Turn::Gemini { parts, .. } => parts
                .iter()
                .filter(|part| matches!(part, GeminiPart::InlineData { .. }))
                .count(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_each_provider_shape() {
        let openai: Turn = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
            ]
        }))
        .unwrap();
        assert_eq!(openai.role(), Role::User);
        assert_eq!(openai.text(), "hello");
        assert_eq!(openai.image_count(), 1);

        let gemini: Turn = serde_json::from_value(json!({
            "role": "model",
            "parts": [{"inline_data": {"mime_type": "image/png", "data": "AAAA"}}, {"text": "hi"}],
            "source_engine": "gemini"
        }))
        .unwrap();
        assert_eq!(gemini.role(), Role::Model);
        assert_eq!(gemini.text(), "hi");
        assert_eq!(gemini.source_engine(), Some(Provider::Gemini));

        let bare: Turn =
            serde_json::from_value(json!({"role": "assistant", "text": "old"})).unwrap();
        assert_eq!(bare.text(), "old");
    }

    #[test]
    fn wire_form_drops_source_tag() {
        let turn = Turn::OpenAi {
            role: Role::Assistant,
            content: OpenAiContent::Text("answer".to_string()),
            source_engine: Some(Provider::OpenAi),
        };
        let wire = serde_json::to_value(turn.to_wire()).unwrap();
        assert_eq!(wire, json!({"role": "assistant", "content": "answer"}));

        let tagged = serde_json::to_value(&turn).unwrap();
        assert_eq!(tagged["source_engine"], "openai");
    }

    #[test]
    fn text_is_empty_when_no_text_part() {
        let turn = Turn::Gemini {
            role: Role::User,
            parts: vec![GeminiPart::InlineData {
                inline_data: InlineData {
                    mime_type: "image/png".to_string(),
                    data: "AAAA".to_string(),
                },
            }],
            source_engine: None,
        };
        assert_eq!(turn.text(), "");
    }
}
