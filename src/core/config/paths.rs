use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::core::config::io::ConfigError;

/// Locations of everything the client reads or writes on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    /// Platform-specific directories for the current user.
    pub fn discover() -> Result<Self, ConfigError> {
        let proj_dirs = ProjectDirs::from("", "", "aiterm").ok_or(ConfigError::NoHomeDirectory)?;
        Ok(Self {
            config_dir: proj_dirs.config_dir().to_path_buf(),
            data_dir: proj_dirs.data_dir().to_path_buf(),
        })
    }

    /// Both trees under one root; used by tests.
    pub fn at(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn dotenv_file(&self) -> PathBuf {
        self.config_dir.join(".env")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn raw_log_file(&self) -> PathBuf {
        self.log_dir().join("raw.log")
    }

    pub fn chatlog_dir(&self) -> PathBuf {
        self.data_dir.join("chatlogs")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    pub fn session_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn memory_file(&self) -> PathBuf {
        self.data_dir.join("persistent_memory.txt")
    }

    /// One JSON file per persona, named `<id>.json`.
    pub fn persona_dir(&self) -> PathBuf {
        self.config_dir.join("personas")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.config_dir.clone(),
            self.log_dir(),
            self.chatlog_dir(),
            self.image_dir(),
            self.session_dir(),
            self.persona_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
