use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::message::Turn;
use crate::utils::redaction::redact_value;

/// One line of a session transcript.
///
/// Single-provider sessions log one `{timestamp, model, prompt, response}`
/// record per turn; multichat sessions log the history records a turn
/// appended under `history_slice`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptEntry {
    Single {
        timestamp: String,
        model: String,
        prompt: Turn,
        response: Turn,
    },
    Multi {
        history_slice: Vec<Turn>,
    },
}

/// Append-only JSONL transcript for one session.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    path: PathBuf,
}

impl TranscriptLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_turn(
        &self,
        model: &str,
        prompt: &Turn,
        response: &Turn,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let entry = TranscriptEntry::Single {
            timestamp: Local::now().to_rfc3339(),
            model: model.to_string(),
            prompt: prompt.clone(),
            response: response.clone(),
        };
        self.append_entry(&entry)
    }

    pub fn append_slice(&self, history_slice: &[Turn]) -> Result<(), Box<dyn std::error::Error>> {
        let entry = TranscriptEntry::Multi {
            history_slice: history_slice.to_vec(),
        };
        self.append_entry(&entry)
    }

    /// Move the transcript to `<stem>.jsonl` in the same directory. An
    /// existing file with that name is never overwritten.
    pub fn rename(&mut self, stem: &str) -> std::io::Result<PathBuf> {
        let target = self.path.with_file_name(format!("{stem}.jsonl"));
        if target == self.path {
            return Ok(target);
        }
        if target.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            ));
        }
        fs::rename(&self.path, &target)?;
        self.path = target.clone();
        Ok(target)
    }

    fn append_entry(&self, entry: &TranscriptEntry) -> Result<(), Box<dyn std::error::Error>> {
        let value = redact_value(&serde_json::to_value(entry)?);
        let line = serde_json::to_string(&value)?;
        append_line(&self.path, &line)
    }

    /// Read every parseable entry; unreadable lines are skipped with a warning.
    pub fn read_entries(path: &Path) -> Result<Vec<TranscriptEntry>, Box<dyn std::error::Error>> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(line = index + 1, error = %err, "skipping unreadable transcript line")
                }
            }
        }
        Ok(entries)
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{line}")?;
    writer.flush()?;
    Ok(())
}

/// Size-capped log file that shifts itself to numbered backups.
///
/// When appending would push `path` past `max_bytes`, `path.N-1` becomes
/// `path.N` down to `path` becoming `path.1`, and the oldest backup beyond
/// `backups` is discarded.
#[derive(Debug, Clone)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    pub fn new(path: PathBuf, max_bytes: u64, backups: usize) -> Self {
        Self {
            path,
            max_bytes,
            backups,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &str) -> Result<(), Box<dyn std::error::Error>> {
        let current = fs::metadata(&self.path).map(|meta| meta.len()).unwrap_or(0);
        let incoming = line.len() as u64 + 1;
        if current > 0 && current + incoming > self.max_bytes {
            self.rotate()?;
        }
        append_line(&self.path, line)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&self) -> std::io::Result<()> {
        if self.backups == 0 {
            return fs::remove_file(&self.path);
        }
        let oldest = self.backup_path(self.backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.backups).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                fs::rename(&from, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))
    }
}

/// Write already-redacted raw API entries as a JSONL file, replacing it.
pub fn write_jsonl(path: &Path, entries: &[Value]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for entry in entries {
        writeln!(writer, "{}", serde_json::to_string(entry)?)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::Provider;
    use crate::core::translate::{construct_assistant_message, construct_user_message};
    use tempfile::TempDir;

    #[test]
    fn transcript_writes_both_shapes_and_reads_them_back() {
        let dir = TempDir::new().unwrap();
        let log = TranscriptLog::new(dir.path().join("chatlogs").join("session.jsonl"));

        let prompt = construct_user_message(Provider::OpenAi, "hi", &[]);
        let reply = construct_assistant_message(Provider::OpenAi, "hello");
        log.append_turn("gpt-4o-mini", &prompt, &reply).unwrap();
        log.append_slice(&[
            prompt.clone(),
            reply.clone().with_source(Provider::OpenAi),
        ])
        .unwrap();

        let entries = TranscriptLog::read_entries(log.path()).unwrap();
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            TranscriptEntry::Single { model, prompt, response, .. } => {
                assert_eq!(model, "gpt-4o-mini");
                assert_eq!(prompt.text(), "hi");
                assert_eq!(response.text(), "hello");
            }
            other => panic!("expected single entry, got {other:?}"),
        }
        match &entries[1] {
            TranscriptEntry::Multi { history_slice } => {
                assert_eq!(history_slice.len(), 2);
                assert_eq!(history_slice[1].source_engine(), Some(Provider::OpenAi));
            }
            other => panic!("expected history slice, got {other:?}"),
        }
    }

    #[test]
    fn transcript_redacts_keys_in_text() {
        let dir = TempDir::new().unwrap();
        let log = TranscriptLog::new(dir.path().join("t.jsonl"));
        let prompt = construct_user_message(
            Provider::Gemini,
            "my key is AIzaSyABCDEFGHIJKLMNOPQRSTUVWXYZ0123",
            &[],
        );
        let reply = construct_assistant_message(Provider::Gemini, "noted");
        log.append_turn("gemini-1.5-flash-latest", &prompt, &reply).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("[REDACTED_GEMINI_KEY]"));
        assert!(!contents.contains("AIzaSyABCDEF"));
    }

    #[test]
    fn rename_moves_the_file_but_never_clobbers() {
        let dir = TempDir::new().unwrap();
        let mut log = TranscriptLog::new(dir.path().join("chat_20260101.jsonl"));
        let prompt = construct_user_message(Provider::OpenAi, "hi", &[]);
        let reply = construct_assistant_message(Provider::OpenAi, "hello");
        log.append_turn("gpt-4o-mini", &prompt, &reply).unwrap();

        let renamed = log.rename("greetings").unwrap();
        assert_eq!(renamed, dir.path().join("greetings.jsonl"));
        assert_eq!(log.path(), renamed.as_path());
        assert!(!dir.path().join("chat_20260101.jsonl").exists());
        assert_eq!(TranscriptLog::read_entries(&renamed).unwrap().len(), 1);

        fs::write(dir.path().join("taken.jsonl"), "keep me\n").unwrap();
        let err = log.rename("taken").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(log.path(), renamed.as_path());
        assert_eq!(
            fs::read_to_string(dir.path().join("taken.jsonl")).unwrap(),
            "keep me\n"
        );
    }

    #[test]
    fn rotating_file_shifts_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.log");
        let file = RotatingFile::new(path.clone(), 16, 2);

        file.append("0123456789").unwrap();
        file.append("abcdefghij").unwrap();
        file.append("ABCDEFGHIJ").unwrap();
        file.append("zzzzzzzzzz").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "zzzzzzzzzz\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("raw.log.1")).unwrap(),
            "ABCDEFGHIJ\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("raw.log.2")).unwrap(),
            "abcdefghij\n"
        );
        assert!(!dir.path().join("raw.log.3").exists());
    }
}
