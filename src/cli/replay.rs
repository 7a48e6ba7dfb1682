//! `aiterm replay`: print a transcript (`.jsonl`) or saved session (`.json`).

use std::error::Error;
use std::path::Path;

use crate::cli::display::format_turn;
use crate::core::snapshot::{load_snapshot, SessionSnapshot};
use crate::utils::logging::{TranscriptEntry, TranscriptLog};

/// Lines to print for the file at `path`, one block per history record.
pub fn render_replay(path: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    let is_snapshot = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_snapshot {
        let history = match load_snapshot(path)? {
            SessionSnapshot::Single(state) => state.history,
            SessionSnapshot::Multichat(state) => state.history,
        };
        return Ok(history.iter().map(format_turn).collect());
    }

    let mut lines = Vec::new();
    for entry in TranscriptLog::read_entries(path)? {
        match entry {
            TranscriptEntry::Single {
                timestamp,
                model,
                prompt,
                response,
            } => {
                lines.push(format!("[{timestamp}] {model}"));
                lines.push(format_turn(&prompt));
                lines.push(format_turn(&response));
            }
            TranscriptEntry::Multi { history_slice } => {
                lines.extend(history_slice.iter().map(format_turn));
            }
        }
    }
    Ok(lines)
}

pub fn run_replay(path: &Path) -> Result<(), Box<dyn Error>> {
    let lines = render_replay(path)?;
    if lines.is_empty() {
        println!("(nothing to replay)");
    }
    for line in lines {
        println!("{line}");
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::Provider;
    use crate::core::session::{ChatSettings, SessionState};
    use crate::core::snapshot::save_snapshot;
    use crate::core::translate::{construct_assistant_message, construct_user_message};
    use tempfile::TempDir;

    #[test]
    fn replays_both_transcript_shapes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.jsonl");
        let log = TranscriptLog::new(path.clone());
        log.append_turn(
            "gemini-pro",
            &construct_user_message(Provider::Gemini, "hi", &[]),
            &construct_assistant_message(Provider::Gemini, "hello"),
        )
        .unwrap();
        log.append_slice(&[
            construct_user_message(Provider::OpenAi, "Director to All: yo", &[]),
            construct_assistant_message(Provider::OpenAi, "hey").with_source(Provider::OpenAi),
            construct_assistant_message(Provider::OpenAi, "hiya").with_source(Provider::Gemini),
        ])
        .unwrap();

        let lines = render_replay(&path).unwrap();
        assert!(lines[0].ends_with("] gemini-pro"));
        assert_eq!(
            &lines[1..],
            &[
                "You: hi",
                "Assistant: hello",
                "You: Director to All: yo",
                "OpenAI: hey",
                "Gemini: hiya",
            ]
        );
    }

    #[test]
    fn replays_saved_sessions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.json");
        let mut state = SessionState::new(Provider::OpenAi, "gpt-4o", &ChatSettings::default());
        state
            .history
            .push(construct_user_message(Provider::OpenAi, "question", &[]));
        state
            .history
            .push(construct_assistant_message(Provider::OpenAi, "answer"));
        save_snapshot(&path, &SessionSnapshot::Single(state)).unwrap();

        assert_eq!(
            render_replay(&path).unwrap(),
            vec!["You: question", "Assistant: answer"]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(render_replay(&dir.path().join("nope.jsonl")).is_err());
    }
}
