use super::data::Config;
use super::io::ConfigError;
use super::paths::AppPaths;
use crate::core::provider::Provider;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent.toml");

    let config = Config::load_from_path(&config_path).expect("load failed");
    assert_eq!(config, Config::default());
}

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.default_engine(), Provider::Gemini);
    assert_eq!(config.api_timeout(), Duration::from_secs(60));
    assert_eq!(config.chat_model(Provider::OpenAi), "gpt-4o-mini");
    assert_eq!(config.chat_model(Provider::Gemini), "gemini-1.5-flash-latest");
    assert_eq!(config.image_model(), "dall-e-3");
    assert_eq!(config.helper_model(Provider::Gemini), "gemini-1.5-flash-latest");
    assert!(config.stream());
    assert!(config.memory_enabled());
    assert_eq!(config.default_max_tokens(), 4096);
    assert_eq!(config.summary_max_tokens(), 4096);
    assert_eq!(config.log_rename_max_tokens(), 2048);
    assert_eq!(config.history_summary_threshold_turns(), 12);
    assert_eq!(config.history_summary_trim_turns(), 6);
}

#[test]
fn test_save_and_load_roundtrip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let paths = AppPaths::at(temp_dir.path());

    let config = Config {
        default_engine: Some("openai".to_string()),
        api_timeout: Some(30),
        stream: Some(false),
        history_summary_threshold_turns: Some(4),
        ..Default::default()
    };
    config.save(&paths).expect("save failed");

    let loaded = Config::load(&paths).expect("load failed");
    assert_eq!(loaded, config);
    assert_eq!(loaded.default_engine(), Provider::OpenAi);
    assert!(!loaded.stream());

    let contents = std::fs::read_to_string(paths.config_file()).unwrap();
    assert!(contents.contains("default_engine = \"openai\""));
    assert!(!contents.contains("memory_enabled"));
}

#[test]
fn invalid_toml_reports_parse_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "stream = \"maybe\"\n[[[").unwrap();

    match Config::load_from_path(&config_path) {
        Err(ConfigError::Parse { path, .. }) => assert_eq!(path, config_path),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn unknown_default_engine_falls_back() {
    let config = Config {
        default_engine: Some("claude".to_string()),
        ..Default::default()
    };
    assert_eq!(config.default_engine(), Provider::Gemini);
}

#[test]
fn app_paths_layout() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let paths = AppPaths::at(temp_dir.path());
    paths.ensure_dirs().expect("dirs");

    assert!(paths.chatlog_dir().is_dir());
    assert!(paths.session_dir().is_dir());
    assert_eq!(paths.raw_log_file(), temp_dir.path().join("data/logs/raw.log"));
    assert_eq!(paths.dotenv_file(), temp_dir.path().join("config/.env"));
}
