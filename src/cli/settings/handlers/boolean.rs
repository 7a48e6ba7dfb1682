//! Boolean setting handlers for on/off settings.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::{
    format_bool, mutate_config_with_message, parse_bool, success_set, success_unset,
};
use crate::cli::settings::{SetContext, SettingHandler};
use crate::core::config::data::Config;

/// Data-driven handler for boolean (on/off) settings.
pub struct BooleanHandler {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    default_display: &'static str,
    get: fn(&Config) -> Option<bool>,
    set_field: fn(&mut Config, Option<bool>),
}

impl SettingHandler for BooleanHandler {
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

        let input = args.join(" ");
        let value = parse_bool(&input).ok_or(SettingError::InvalidBoolean(input))?;
        let set_field = self.set_field;

        mutate_config_with_message(
            ctx.paths,
            move |config| {
                set_field(config, Some(value));
                Ok(())
            },
            success_set(self.key, format_bool(value)),
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
            success_unset(self.key, self.default_display),
        )
    }

    fn format(&self, config: &Config) -> String {
        match (self.get)(config) {
            Some(value) => format!("  {}: {}", self.key, format_bool(value)),
            None => format!("  {}: (unset, default: {})", self.key, self.default_display),
        }
    }
}

/// Create a handler for the `stream` setting.
pub fn stream_handler() -> BooleanHandler {
    BooleanHandler {
        key: "stream",
        hint: "To set streaming, specify on or off:",
        example: "aiterm set stream off",
        default_display: "on",
        get: |c| c.stream,
        set_field: |c, v| c.stream = v,
    }
}

/// Create a handler for the `memory-enabled` setting.
pub fn memory_enabled_handler() -> BooleanHandler {
    BooleanHandler {
        key: "memory-enabled",
        hint: "To include persistent memory in the system prompt, specify on or off:",
        example: "aiterm set memory-enabled off",
        default_display: "on",
        get: |c| c.memory_enabled,
        set_field: |c, v| c.memory_enabled = v,
    }
}
