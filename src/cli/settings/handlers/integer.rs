//! Whole-number settings: timeouts, token limits and summary thresholds.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::{mutate_config_with_message, success_set, success_unset};
use crate::cli::settings::{SetContext, SettingHandler};
use crate::core::config::data::{
    Config, DEFAULT_API_TIMEOUT_SECS, DEFAULT_HISTORY_SUMMARY_THRESHOLD_TURNS,
    DEFAULT_HISTORY_SUMMARY_TRIM_TURNS, DEFAULT_LOG_RENAME_MAX_TOKENS, DEFAULT_MAX_TOKENS,
    DEFAULT_SUMMARY_MAX_TOKENS,
};

/// Data-driven handler for integer settings with an accepted range.
pub struct IntegerHandler {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    default_value: u64,
    min: u64,
    max: u64,
    get: fn(&Config) -> Option<u64>,
    set_field: fn(&mut Config, Option<u64>),
}

impl IntegerHandler {
    fn parse(&self, input: &str) -> Result<u64, SettingError> {
        input
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|value| (self.min..=self.max).contains(value))
            .ok_or_else(|| SettingError::InvalidNumber {
                key: self.key,
                input: input.to_string(),
                min: self.min,
                max: self.max,
            })
    }
}

impl SettingHandler for IntegerHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], ctx: &SetContext<'_>) -> Result<String, SettingError> {
        if args.is_empty() {
            return Err(SettingError::MissingArgs {
                hint: self.hint,
                example: self.example,
            });
        }

        let value = self.parse(&args.join(" "))?;
        let set_field = self.set_field;

        mutate_config_with_message(
            ctx.paths,
            move |config| {
                set_field(config, Some(value));
                Ok(())
            },
            success_set(self.key, &value.to_string()),
        )
    }

    fn unset(&self, ctx: &SetContext<'_>) -> Result<String, SettingError> {
        let set_field = self.set_field;
        mutate_config_with_message(
            ctx.paths,
            move |config| {
                set_field(config, None);
                Ok(())
            },
            success_unset(self.key, &self.default_value.to_string()),
        )
    }

    fn format(&self, config: &Config) -> String {
        match (self.get)(config) {
            Some(value) => format!("  {}: {}", self.key, value),
            None => format!("  {}: (unset, default: {})", self.key, self.default_value),
        }
    }
}

pub fn api_timeout_handler() -> IntegerHandler {
    IntegerHandler {
        key: "api-timeout",
        hint: "To set the request timeout, give a number of seconds:",
        example: "aiterm set api-timeout 120",
        default_value: DEFAULT_API_TIMEOUT_SECS,
        min: 1,
        max: 3600,
        get: |c| c.api_timeout,
        set_field: |c, v| c.api_timeout = v,
    }
}

pub fn default_max_tokens_handler() -> IntegerHandler {
    IntegerHandler {
        key: "default-max-tokens",
        hint: "To set the response token limit, give a number (0 lets the provider decide):",
        example: "aiterm set default-max-tokens 2048",
        default_value: u64::from(DEFAULT_MAX_TOKENS),
        min: 0,
        max: u64::from(u32::MAX),
        get: |c| c.default_max_tokens.map(u64::from),
        set_field: |c, v| c.default_max_tokens = v.and_then(|n| u32::try_from(n).ok()),
    }
}

pub fn summary_max_tokens_handler() -> IntegerHandler {
    IntegerHandler {
        key: "summary-max-tokens",
        hint: "To set the history summary token limit, give a number:",
        example: "aiterm set summary-max-tokens 1024",
        default_value: u64::from(DEFAULT_SUMMARY_MAX_TOKENS),
        min: 1,
        max: u64::from(u32::MAX),
        get: |c| c.summary_max_tokens.map(u64::from),
        set_field: |c, v| c.summary_max_tokens = v.and_then(|n| u32::try_from(n).ok()),
    }
}

pub fn log_rename_max_tokens_handler() -> IntegerHandler {
    IntegerHandler {
        key: "log-rename-max-tokens",
        hint: "To set the token limit for naming transcripts, give a number:",
        example: "aiterm set log-rename-max-tokens 512",
        default_value: u64::from(DEFAULT_LOG_RENAME_MAX_TOKENS),
        min: 1,
        max: u64::from(u32::MAX),
        get: |c| c.log_rename_max_tokens.map(u64::from),
        set_field: |c, v| c.log_rename_max_tokens = v.and_then(|n| u32::try_from(n).ok()),
    }
}

pub fn summary_threshold_handler() -> IntegerHandler {
    IntegerHandler {
        key: "history-summary-threshold-turns",
        hint: "To set when history is condensed, give a number of turns (0 disables):",
        example: "aiterm set history-summary-threshold-turns 20",
        default_value: DEFAULT_HISTORY_SUMMARY_THRESHOLD_TURNS as u64,
        min: 0,
        max: 10_000,
        get: |c| c.history_summary_threshold_turns.map(|n| n as u64),
        set_field: |c, v| c.history_summary_threshold_turns = v.map(|n| n as usize),
    }
}

pub fn summary_trim_handler() -> IntegerHandler {
    IntegerHandler {
        key: "history-summary-trim-turns",
        hint: "To set how many turns are folded into a summary, give a number:",
        example: "aiterm set history-summary-trim-turns 8",
        default_value: DEFAULT_HISTORY_SUMMARY_TRIM_TURNS as u64,
        min: 1,
        max: 10_000,
        get: |c| c.history_summary_trim_turns.map(|n| n as u64),
        set_field: |c, v| c.history_summary_trim_turns = v.map(|n| n as usize),
    }
}
