//! Helper functions for settings operations.

use crate::core::config::data::Config;
use crate::core::config::paths::AppPaths;

use super::error::SettingError;

/// Load the config file, apply `f`, and write it back.
pub fn mutate_config<F>(paths: &AppPaths, f: F) -> Result<(), SettingError>
where
    F: FnOnce(&mut Config) -> Result<(), SettingError>,
{
    let mut config =
        Config::load(paths).map_err(|e| SettingError::ConfigError(e.to_string()))?;
    f(&mut config)?;
    config
        .save(paths)
        .map_err(|e| SettingError::ConfigError(e.to_string()))
}

/// [`mutate_config`], returning `message` on success.
pub fn mutate_config_with_message<F>(
    paths: &AppPaths,
    f: F,
    message: String,
) -> Result<String, SettingError>
where
    F: FnOnce(&mut Config) -> Result<(), SettingError>,
{
    mutate_config(paths, f)?;
    Ok(message)
}

/// Parse a boolean value from user input.
///
/// Accepts: on/off, true/false, yes/no (case-insensitive).
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Format a boolean value for display.
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Keys are shown with hyphens; underscores are accepted too.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

pub fn success_set(key: &str, value: &str) -> String {
    format!("✅ Set {key} to: {value}")
}

pub fn success_unset(key: &str, default_display: &str) -> String {
    format!("✅ Unset {key} (will use default: {default_display})")
}
