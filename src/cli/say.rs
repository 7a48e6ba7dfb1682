//! Non-interactive "say" command

use std::error::Error;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::cli::chat::session_from_args;
use crate::cli::{cancel_on_ctrl_c, AppContext, ChatArgs};
use crate::core::chat_stream::{NullSink, StdoutSink, StreamEnd};
use crate::utils::formatters::file_timestamp;
use crate::utils::input::sanitize_text_input;
use crate::utils::logging::TranscriptLog;

pub async fn run_say(
    ctx: &AppContext,
    options: ChatArgs,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = sanitize_text_input(&prompt.join(" "));
    if prompt.trim().is_empty() {
        eprintln!("Usage: aiterm say <prompt>");
        std::process::exit(1);
    }

    let (session, _) = session_from_args(ctx, &options);
    let stem = format!("say_{}_{}", file_timestamp(Local::now()), session.provider());
    let transcript = TranscriptLog::new(ctx.paths.chatlog_dir().join(format!("{stem}.jsonl")));
    let mut session = session.with_transcript(transcript);

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);
    let streaming = session.state().stream;
    let result = if streaming {
        session.single_shot(&prompt, &mut StdoutSink, &cancel).await
    } else {
        session.single_shot(&prompt, &mut NullSink, &cancel).await
    };
    watcher.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("❌ Error: {err}");
            ctx.save_debug_log(&stem);
            std::process::exit(1);
        }
    };

    if streaming {
        println!();
    } else {
        println!("{}", outcome.text);
    }
    match &outcome.end {
        StreamEnd::Completed => {}
        StreamEnd::Cancelled => eprintln!("⏹  Response cancelled"),
        StreamEnd::Failed(reason) => eprintln!("⚠️  Response ended early: {reason}"),
    }
    eprintln!("{}", outcome.usage.summary());
    ctx.save_debug_log(&stem);
    Ok(())
}
