use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::core::provider::Provider;

pub const DEFAULT_ENGINE: Provider = Provider::Gemini;
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_OPENAI_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_HELPER_MODEL_OPENAI: &str = "gpt-4o-mini";
pub const DEFAULT_HELPER_MODEL_GEMINI: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_LOG_RENAME_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_HISTORY_SUMMARY_THRESHOLD_TURNS: usize = 12;
pub const DEFAULT_HISTORY_SUMMARY_TRIM_TURNS: usize = 6;

/// User settings persisted in `config.toml`.
///
/// Every field is optional; unset fields fall back to the defaults above
/// through the accessor methods.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Provider used when none is given on the command line; also the
    /// foreground provider in multichat.
    pub default_engine: Option<String>,
    /// Seconds to wait for a response (or, when streaming, for each frame).
    pub api_timeout: Option<u64>,
    pub default_openai_chat_model: Option<String>,
    pub default_gemini_model: Option<String>,
    pub default_openai_image_model: Option<String>,
    /// Model used for internal requests such as history summaries.
    pub helper_model_openai: Option<String>,
    pub helper_model_gemini: Option<String>,
    pub stream: Option<bool>,
    /// Include the persistent memory file in the system prompt.
    pub memory_enabled: Option<bool>,
    pub default_max_tokens: Option<u32>,
    pub summary_max_tokens: Option<u32>,
    /// Token limit for the request that names a transcript at exit.
    pub log_rename_max_tokens: Option<u32>,
    /// Condense once history reaches this many user/assistant pairs.
    pub history_summary_threshold_turns: Option<usize>,
    /// Number of oldest pairs folded into the summary.
    pub history_summary_trim_turns: Option<usize>,
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn default_engine(&self) -> Provider {
        match self.default_engine.as_deref() {
            None => DEFAULT_ENGINE,
            Some(name) => name.parse().unwrap_or_else(|err| {
                warn!(%err, "ignoring invalid default_engine");
                DEFAULT_ENGINE
            }),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(
            self.api_timeout
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_API_TIMEOUT_SECS),
        )
    }

    pub fn chat_model(&self, provider: Provider) -> String {
        match provider {
            Provider::OpenAi => self
                .default_openai_chat_model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_CHAT_MODEL.to_string()),
            Provider::Gemini => self
                .default_gemini_model
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        }
    }

    pub fn image_model(&self) -> String {
        self.default_openai_image_model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_IMAGE_MODEL.to_string())
    }

    pub fn helper_model(&self, provider: Provider) -> String {
        match provider {
            Provider::OpenAi => self
                .helper_model_openai
                .clone()
                .unwrap_or_else(|| DEFAULT_HELPER_MODEL_OPENAI.to_string()),
            Provider::Gemini => self
                .helper_model_gemini
                .clone()
                .unwrap_or_else(|| DEFAULT_HELPER_MODEL_GEMINI.to_string()),
        }
    }

    pub fn stream(&self) -> bool {
        self.stream.unwrap_or(true)
    }

    pub fn memory_enabled(&self) -> bool {
        self.memory_enabled.unwrap_or(true)
    }

    pub fn default_max_tokens(&self) -> u32 {
        self.default_max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn summary_max_tokens(&self) -> u32 {
        self.summary_max_tokens.unwrap_or(DEFAULT_SUMMARY_MAX_TOKENS)
    }

    pub fn log_rename_max_tokens(&self) -> u32 {
        self.log_rename_max_tokens
            .unwrap_or(DEFAULT_LOG_RENAME_MAX_TOKENS)
    }

    pub fn history_summary_threshold_turns(&self) -> usize {
        self.history_summary_threshold_turns
            .unwrap_or(DEFAULT_HISTORY_SUMMARY_THRESHOLD_TURNS)
    }

    pub fn history_summary_trim_turns(&self) -> usize {
        self.history_summary_trim_turns
            .unwrap_or(DEFAULT_HISTORY_SUMMARY_TRIM_TURNS)
    }
}
