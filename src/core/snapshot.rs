//! Saving and restoring whole sessions as JSON.
//!
//! Snapshots hold everything needed to pick a conversation back up except
//! the credential, which is resolved from the environment again on load.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::core::config::data::path_display;
use crate::core::multichat::MultiChatState;
use crate::core::session::SessionState;
use crate::utils::formatters::sanitize_filename;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "session_type", rename_all = "lowercase")]
pub enum SessionSnapshot {
    Single(SessionState),
    Multichat(MultiChatState),
}

impl SessionSnapshot {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionSnapshot::Single(_) => "single",
            SessionSnapshot::Multichat(_) => "multichat",
        }
    }
}

#[derive(Debug)]
pub enum SnapshotError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Encode(serde_json::Error),
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io { path, source } => {
                write!(f, "Session file {}: {}", path_display(path), source)
            }
            SnapshotError::Parse { path, source } => write!(
                f,
                "Session file {} is not a valid session: {}",
                path_display(path),
                source
            ),
            SnapshotError::Encode(source) => write!(f, "Could not encode session: {source}"),
            SnapshotError::WrongKind { expected, found } => write!(
                f,
                "This is a {found} session; it cannot be loaded as a {expected} session"
            ),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io { source, .. } => Some(source),
            SnapshotError::Parse { source, .. } => Some(source),
            SnapshotError::Encode(source) => Some(source),
            SnapshotError::WrongKind { .. } => None,
        }
    }
}

/// `<dir>/<name>.json`, with the name made filesystem-safe.
pub fn snapshot_path(dir: &Path, name: &str) -> PathBuf {
    let stem = name.trim().trim_end_matches(".json");
    dir.join(format!("{}.json", sanitize_filename(stem, 100)))
}

/// Write the snapshot, replacing any previous file in one step.
pub fn save_snapshot(path: &Path, snapshot: &SessionSnapshot) -> Result<(), SnapshotError> {
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };
    let contents = serde_json::to_string_pretty(snapshot).map_err(SnapshotError::Encode)?;

    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let mut temp_file = match parent {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(io_err)?;
    temp_file.write_all(contents.as_bytes()).map_err(io_err)?;
    temp_file.as_file_mut().sync_all().map_err(io_err)?;
    temp_file.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<SessionSnapshot, SnapshotError> {
    let contents = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| SnapshotError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_single(path: &Path) -> Result<SessionState, SnapshotError> {
    match load_snapshot(path)? {
        SessionSnapshot::Single(state) => Ok(state),
        other => Err(SnapshotError::WrongKind {
            expected: "single",
            found: other.kind(),
        }),
    }
}

pub fn load_multichat(path: &Path) -> Result<MultiChatState, SnapshotError> {
    match load_snapshot(path)? {
        SessionSnapshot::Multichat(state) => Ok(state),
        other => Err(SnapshotError::WrongKind {
            expected: "multichat",
            found: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::Provider;
    use crate::core::session::ChatSettings;
    use crate::core::message::{Role, Turn};
    use crate::core::translate::{
        construct_assistant_message, construct_user_message, translate_history,
    };
    use tempfile::TempDir;

    fn single_state() -> SessionState {
        let mut state = SessionState::new(Provider::Gemini, "gemini-pro", &ChatSettings::default());
        state.system_prompt = Some("Be terse.".into());
        state
            .history
            .push(construct_user_message(Provider::Gemini, "hi", &[]));
        state
            .history
            .push(construct_assistant_message(Provider::Gemini, "hello"));
        state.totals.prompt = 12;
        state
    }

    #[test]
    fn single_session_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(dir.path(), "my chat");
        assert!(path.ends_with("my_chat.json"));

        let state = single_state();
        save_snapshot(&path, &SessionSnapshot::Single(state.clone())).unwrap();
        assert_eq!(load_single(&path).unwrap(), state);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["session_type"], "single");
        assert_eq!(raw["engine_name"], "gemini");
        assert!(!raw.to_string().contains("api_key"));
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("multi.json");
        let state = MultiChatState {
            primary: Provider::OpenAi,
            openai_model: "gpt-4o".into(),
            gemini_model: "gemini-pro".into(),
            history: Vec::new(),
            totals: Default::default(),
            last_turn_usage: Default::default(),
            stream: true,
            max_tokens: Some(100),
            openai_persona: Some("Be terse.".into()),
            gemini_persona: None,
        };
        save_snapshot(&path, &SessionSnapshot::Multichat(state.clone())).unwrap();

        assert_eq!(load_multichat(&path).unwrap(), state);
        match load_single(&path) {
            Err(SnapshotError::WrongKind { expected, found }) => {
                assert_eq!(expected, "single");
                assert_eq!(found, "multichat");
            }
            other => panic!("expected kind mismatch, got {other:?}"),
        }
    }

    #[test]
    fn overwrite_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.json");
        let mut state = single_state();
        save_snapshot(&path, &SessionSnapshot::Single(state.clone())).unwrap();
        state.history.clear();
        save_snapshot(&path, &SessionSnapshot::Single(state.clone())).unwrap();

        assert!(load_single(&path).unwrap().history.is_empty());
    }

    #[test]
    fn unknown_roles_do_not_break_loading() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tools.json");
        fs::write(
            &path,
            r#"{
                "session_type": "single",
                "engine_name": "openai",
                "model": "gpt-4o",
                "stream": true,
                "history": [
                    {"role": "user", "content": "weather?"},
                    {"role": "tool", "content": "{\"temp\": 12}"},
                    {"role": "assistant", "content": "It is 12 degrees."}
                ]
            }"#,
        )
        .unwrap();

        let state = load_single(&path).unwrap();
        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history[1].role(), Role::Unknown);

        let for_gemini = translate_history(&state.history, Provider::Gemini);
        let texts: Vec<&str> = for_gemini.iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["weather?", "It is 12 degrees."]);
    }

    #[test]
    fn missing_and_corrupt_files_are_reported() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_snapshot(&dir.path().join("none.json")),
            Err(SnapshotError::Io { .. })
        ));
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{\"session_type\":\"single\"").unwrap();
        assert!(matches!(load_snapshot(&bad), Err(SnapshotError::Parse { .. })));
    }
}
