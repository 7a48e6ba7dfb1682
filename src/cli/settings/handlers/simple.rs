//! Handler for the `default-engine` setting.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::{mutate_config_with_message, success_set, success_unset};
use crate::cli::settings::{SetContext, SettingHandler};
use crate::core::config::data::{Config, DEFAULT_ENGINE};
use crate::core::provider::Provider;

pub struct DefaultEngineHandler;

impl SettingHandler for DefaultEngineHandler {
    fn key(&self) -> &'static str {
        "default-engine"
    }

    fn set(&self, args: &[String], ctx: &SetContext<'_>) -> Result<String, SettingError> {
        if args.is_empty() {
            return Err(SettingError::MissingArgs {
                hint: "To set a default engine, specify openai or gemini:",
                example: "aiterm set default-engine openai",
            });
        }

        let input = args.join(" ");
        let provider: Provider = input
            .parse()
            .map_err(|_| SettingError::UnknownEngine { input })?;
        let message = success_set("default-engine", provider.as_str());

        mutate_config_with_message(
            ctx.paths,
            move |config| {
                config.default_engine = Some(provider.as_str().to_string());
                Ok(())
            },
            message,
        )
    }

    fn unset(&self, ctx: &SetContext<'_>) -> Result<String, SettingError> {
        mutate_config_with_message(
            ctx.paths,
            |config| {
                config.default_engine = None;
                Ok(())
            },
            success_unset("default-engine", DEFAULT_ENGINE.as_str()),
        )
    }

    fn format(&self, config: &Config) -> String {
        match &config.default_engine {
            Some(engine) => format!("  default-engine: {engine}"),
            None => format!("  default-engine: (unset, default: {DEFAULT_ENGINE})"),
        }
    }
}
