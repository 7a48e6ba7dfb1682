//! Plain-text rendering shared by the interactive loops and `replay`.

use std::io::Write;

use crate::core::chat_stream::StreamSink;
use crate::core::message::{Role, Turn};
use crate::core::usage::{TokenTotals, TokenUsage};

/// Who a history record should be attributed to when printed.
pub fn speaker(turn: &Turn) -> String {
    match (turn.role(), turn.source_engine()) {
        (Role::User, _) => "You".to_string(),
        (Role::System, _) => "System".to_string(),
        (Role::Unknown, _) => "Other".to_string(),
        (_, Some(provider)) => provider.display_name().to_string(),
        (_, None) => "Assistant".to_string(),
    }
}

pub fn format_turn(turn: &Turn) -> String {
    let images = turn.image_count();
    let suffix = match images {
        0 => String::new(),
        1 => " [+1 image]".to_string(),
        n => format!(" [+{n} images]"),
    };
    format!("{}: {}{}", speaker(turn), turn.text(), suffix)
}

/// Streams deltas to stdout, printing `label: ` before the first one.
pub struct LabelledStdout {
    label: String,
    started: bool,
}

impl LabelledStdout {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: false,
        }
    }

    /// Whether any text reached the terminal.
    pub fn started(&self) -> bool {
        self.started
    }
}

impl StreamSink for LabelledStdout {
    fn on_delta(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        if !self.started {
            let _ = write!(stdout, "{}: ", self.label);
            self.started = true;
        }
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

pub fn print_history(history: &[Turn]) {
    if history.is_empty() {
        println!("(no messages yet)");
        return;
    }
    for turn in history {
        println!("{}", format_turn(turn));
        println!();
    }
}

pub fn print_usage(last: &TokenUsage, totals: &TokenTotals) {
    eprintln!(
        "{}  session: {} prompt / {} completion",
        last.summary(),
        totals.prompt,
        totals.completion
    );
}

pub fn format_max_tokens(max_tokens: Option<u32>) -> String {
    match max_tokens {
        Some(n) if n > 0 => n.to_string(),
        _ => "provider default".to_string(),
    }
}
