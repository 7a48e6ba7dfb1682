//! Settings management for CLI set/unset commands.
//!
//! Each configuration key is handled by a [`SettingHandler`]. Most are
//! data-driven instances of a handful of shapes:
//!
//! - Boolean settings (`stream`, `memory-enabled`)
//! - Integer settings (`api-timeout`, `default-max-tokens`, ...)
//! - Model-name settings (`default-gemini-model`, `helper-model-openai`, ...)
//! - `default-engine`, validated against the supported providers

pub mod error;
pub mod handlers;
pub mod helpers;
pub mod registry;

pub use error::SettingError;
pub use registry::SettingRegistry;

use crate::core::config::data::Config;
use crate::core::config::paths::AppPaths;

/// Context provided to setting handlers during set/unset operations.
pub struct SetContext<'a> {
    pub config: &'a Config,
    pub paths: &'a AppPaths,
}

/// Trait for handling a configuration setting.
pub trait SettingHandler: Send + Sync {
    /// Returns the configuration key this handler manages.
    fn key(&self) -> &'static str;

    /// Set the configuration value from the words following the key.
    ///
    /// Returns a success message to display, or an error.
    fn set(&self, args: &[String], ctx: &SetContext<'_>) -> Result<String, SettingError>;

    /// Unset (clear) the configuration value so the default applies again.
    fn unset(&self, ctx: &SetContext<'_>) -> Result<String, SettingError>;

    /// Format the current value for display in `aiterm set` output.
    fn format(&self, config: &Config) -> String;
}

/// `aiterm set [key] [value..]`. With no key, lists every setting.
pub fn run_set(
    registry: &SettingRegistry,
    ctx: &SetContext<'_>,
    key: Option<&str>,
    args: &[String],
) -> Result<String, SettingError> {
    let Some(key) = key else {
        let mut lines = vec!["Current configuration:".to_string()];
        lines.extend(
            registry
                .keys_display_order()
                .iter()
                .filter_map(|key| registry.get(key))
                .map(|handler| handler.format(ctx.config)),
        );
        return Ok(lines.join("\n"));
    };
    let normalized = helpers::normalize_key(key);
    let handler = registry
        .get(&normalized)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    handler.set(args, ctx)
}

/// `aiterm unset <key>`.
pub fn run_unset(
    registry: &SettingRegistry,
    ctx: &SetContext<'_>,
    key: &str,
) -> Result<String, SettingError> {
    let normalized = helpers::normalize_key(key);
    let handler = registry
        .get(&normalized)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    handler.unset(ctx)
}
