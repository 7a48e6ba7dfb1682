use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The closed set of hosted backends the client can talk to.
///
/// Variant order is the fixed placement order used when several providers
/// answer the same broadcast turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::Gemini];

    /// Lowercase identifier used in config files, snapshots and history tags.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Gemini => "Gemini",
        }
    }

    /// Identifier with only the first letter upper-cased ("Openai", "Gemini").
    ///
    /// This is the form used inside conversation text: relabeled turns,
    /// director addressing and self-label stripping.
    pub fn label(self) -> &'static str {
        match self {
            Provider::OpenAi => "Openai",
            Provider::Gemini => "Gemini",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => OPENAI_BASE_URL,
            Provider::Gemini => GEMINI_BASE_URL,
        }
    }

    /// Role name this provider uses for its own replies.
    pub fn assistant_role(self) -> &'static str {
        match self {
            Provider::OpenAi => "assistant",
            Provider::Gemini => "model",
        }
    }

    pub fn other(self) -> Provider {
        match self {
            Provider::OpenAi => Provider::Gemini,
            Provider::Gemini => Provider::OpenAi,
        }
    }

    /// Resolve the short aliases accepted by `/ai` addressing.
    pub fn from_alias(alias: &str) -> Option<Provider> {
        match alias.trim().to_ascii_lowercase().as_str() {
            "gpt" | "openai" => Some(Provider::OpenAi),
            "gem" | "gemini" => Some(Provider::Gemini),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProviderError(pub String);

impl fmt::Display for UnknownProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown engine '{}'. Expected 'openai' or 'gemini'.",
            self.0
        )
    }
}

impl std::error::Error for UnknownProviderError {}

impl FromStr for Provider {
    type Err = UnknownProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            _ => Err(UnknownProviderError(s.to_string())),
        }
    }
}
