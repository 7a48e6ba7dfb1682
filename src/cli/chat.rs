//! Interactive single-provider chat loop.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::images::{generate_image, save_image};
use crate::api::models::ModelTask;
use crate::cli::display::{format_max_tokens, print_history, print_usage, LabelledStdout};
use crate::cli::{
    cancel_on_ctrl_c, engine_or_exit, read_input, resolve_provider, stdin_lines, AppContext,
    ChatArgs,
};
use crate::commands::{help_text, parse_input, CommandMode, ParsedInput, SlashCommand};
use crate::core::api_client::ChatBackend;
use crate::core::chat_stream::{NullSink, StreamEnd};
use crate::core::engine::Engine;
use crate::core::error::HelperError;
use crate::core::memory::MemoryStore;
use crate::core::persona::{list_personas, load_persona, PersonaFile};
use crate::core::provider::Provider;
use crate::core::session::{ChatSession, ChatSettings};
use crate::core::snapshot::{load_single, save_snapshot, snapshot_path, SessionSnapshot};
use crate::utils::formatters::{file_timestamp, sanitize_filename};
use crate::utils::input::{
    load_attachment, load_image, sanitize_text_input, Attachment, AttachmentError,
};
use crate::utils::logging::TranscriptLog;

/// How a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Leave {
    /// Update memory and name the transcript, using the name if given.
    WrapUp(Option<String>),
    Quietly,
}

/// What the loop should do after a slash command.
enum Flow {
    Continue,
    Exit(Leave),
}

pub(crate) fn exit_with(message: impl std::fmt::Display) -> ! {
    eprintln!("❌ {message}");
    std::process::exit(1);
}

pub(crate) fn memory_store(ctx: &AppContext) -> MemoryStore {
    MemoryStore::new(ctx.paths.memory_file())
}

/// Read the persistent memory file when memory is enabled.
fn read_memory(ctx: &AppContext) -> Option<String> {
    if !ctx.config.memory_enabled() {
        return None;
    }
    let store = memory_store(ctx);
    match store.read() {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(err) => {
            warn!(path = %store.path().display(), error = %err, "could not read memory file");
            None
        }
    }
}

/// `/memory`: print the memory file.
pub(crate) fn show_memory(ctx: &AppContext) {
    match memory_store(ctx).read() {
        Ok(text) if text.trim().is_empty() => println!("Persistent memory is currently empty."),
        Ok(text) => println!("--- Persistent Memory ---\n{}", text.trim()),
        Err(err) => eprintln!("❌ Could not read memory file: {err}"),
    }
}

/// Existing memory text for a `/remember`, or `None` after reporting why
/// it could not be read.
pub(crate) fn existing_memory(store: &MemoryStore) -> Option<String> {
    match store.read() {
        Ok(text) => Some(text),
        Err(err) => {
            eprintln!("❌ Could not read memory file: {err}");
            None
        }
    }
}

/// Write the outcome of a `/remember` to disk. Returns the stored text.
pub(crate) fn store_memory(
    store: &MemoryStore,
    updated: Result<String, HelperError>,
) -> Option<String> {
    let updated = match updated {
        Ok(updated) => updated,
        Err(err) => {
            eprintln!("❌ Memory update failed: {err}");
            return None;
        }
    };
    match store.write(&updated) {
        Ok(()) => {
            println!("🧠 Persistent memory updated");
            Some(updated)
        }
        Err(err) => {
            eprintln!("❌ Could not write memory file: {err}");
            None
        }
    }
}

/// Read every file a persona brings along.
pub(crate) fn persona_attachments(file: &PersonaFile) -> Result<Vec<Attachment>, AttachmentError> {
    file.persona
        .attachments
        .iter()
        .map(|path| load_attachment(path))
        .collect()
}

/// Build the session described by the command line, exiting on bad input.
pub(crate) fn session_from_args(
    ctx: &AppContext,
    options: &ChatArgs,
) -> (ChatSession, String) {
    let mut settings = ChatSettings::from_config(&ctx.config);
    if options.no_stream {
        settings.stream = false;
    }
    if let Some(limit) = options.max_tokens {
        settings.max_tokens = (limit > 0).then_some(limit);
    }
    let backend: Arc<dyn ChatBackend> = Arc::new(ctx.client.clone());
    let persona = options.persona.as_deref().map(|name| {
        load_persona(&ctx.paths.persona_dir(), name).unwrap_or_else(|err| exit_with(err))
    });

    if let Some(name) = &options.load {
        let path = snapshot_path(&ctx.paths.session_dir(), name);
        let mut state = load_single(&path).unwrap_or_else(|err| exit_with(err));
        if options.no_stream {
            state.stream = false;
        }
        if options.max_tokens.is_some() {
            state.max_tokens = settings.max_tokens;
        }
        if let Some(model) = &options.model {
            state.model = model.clone();
        }
        let engine = engine_or_exit(state.engine_name);
        let session = ChatSession::from_state(backend, engine, state, settings);
        return (session, sanitize_filename(name, 100));
    }

    let persona_engine = persona.as_ref().and_then(|file| file.persona.engine);
    let provider = match (options.engine.as_deref(), persona_engine) {
        (None, Some(provider)) => provider,
        (engine, _) => resolve_provider(engine, &ctx.config).unwrap_or_else(|err| exit_with(err)),
    };
    let engine = engine_or_exit(provider);
    let max_tokens = settings.max_tokens;
    let model = ctx.config.chat_model(provider);
    let mut session = ChatSession::new(backend, engine, model, settings);

    // Flags given on the command line win over the persona's settings.
    if let Some(file) = &persona {
        let attachments = persona_attachments(file).unwrap_or_else(|err| exit_with(err));
        session.apply_persona(file, attachments);
    }
    let state = session.state_mut();
    if let Some(model) = &options.model {
        state.model = model.clone();
    }
    if options.system.is_some() {
        state.system_prompt = options.system.clone();
    }
    if options.max_tokens.is_some() {
        state.max_tokens = max_tokens;
    }
    if options.no_stream {
        state.stream = false;
    }
    state.memory = read_memory(ctx);
    for path in &options.files {
        state
            .attachments
            .push(load_attachment(path).unwrap_or_else(|err| exit_with(err)));
    }
    for path in &options.images {
        state
            .images
            .push(load_image(path).unwrap_or_else(|err| exit_with(err)));
    }

    let stem = format!("chat_{}_{}", file_timestamp(Local::now()), provider);
    (session, stem)
}

pub async fn run_chat(ctx: &AppContext, options: ChatArgs) -> Result<(), Box<dyn Error>> {
    let (session, stem) = session_from_args(ctx, &options);
    let transcript = TranscriptLog::new(ctx.paths.chatlog_dir().join(format!("{stem}.jsonl")));
    let mut session = session.with_transcript(transcript);

    eprintln!(
        "🚀 aiterm: chatting with {} ({})",
        session.provider().display_name(),
        session.state().model
    );
    if !session.history().is_empty() {
        eprintln!("📂 Resumed {} messages", session.history().len());
    }
    eprintln!("💡 Type /help for commands, /exit or Ctrl+C to quit");

    let mut leave = Leave::WrapUp(None);
    let mut lines = stdin_lines();
    while let Some(line) = read_input(&mut lines, "You: ").await? {
        match parse_input(&line, CommandMode::Single) {
            ParsedInput::Message(text) => {
                let text = sanitize_text_input(&text);
                if text.trim().is_empty() {
                    continue;
                }
                send_turn(&mut session, &text).await;
            }
            ParsedInput::Command(command) => {
                if let Flow::Exit(how) = run_command(ctx, &mut session, command).await {
                    leave = how;
                    break;
                }
            }
            ParsedInput::Invalid(usage) => eprintln!("{usage}"),
            ParsedInput::Unknown(name) => {
                eprintln!("Unknown command: {name}. Type /help for a list.")
            }
        }
    }

    if let Leave::WrapUp(name) = leave {
        if !session.history().is_empty() {
            eprintln!("⏳ Wrapping up the session...");
        }
        let wrap_up = session
            .finalize(Some(&memory_store(ctx)), name.as_deref())
            .await;
        if wrap_up.memory_updated {
            eprintln!("🧠 Persistent memory updated");
        }
    }
    if let Some(path) = session.transcript_path() {
        if path.exists() {
            eprintln!("💾 Transcript: {}", path.display());
        }
    }
    ctx.save_debug_log(&stem);
    Ok(())
}

async fn send_turn(session: &mut ChatSession, text: &str) {
    let label = session.provider().display_name();
    let streaming = session.state().stream;
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);

    let result = if streaming {
        let mut sink = LabelledStdout::new(label);
        let result = session.take_turn(text, &mut sink, &cancel).await;
        if sink.started() {
            println!();
        }
        result.map(|outcome| (outcome, sink.started()))
    } else {
        session
            .take_turn(text, &mut NullSink, &cancel)
            .await
            .map(|outcome| (outcome, false))
    };
    watcher.abort();

    match result {
        Ok((outcome, shown)) => {
            if !shown && !outcome.text.is_empty() {
                println!("{label}: {}", outcome.text);
            }
            match &outcome.end {
                StreamEnd::Completed => {}
                StreamEnd::Cancelled => eprintln!("⏹  Response cancelled"),
                StreamEnd::Failed(reason) => eprintln!("⚠️  Response ended early: {reason}"),
            }
            if !outcome.appended {
                eprintln!("(nothing received; the message was not added to history)");
                return;
            }
            println!();
            print_usage(&outcome.usage, &session.state().totals);
            if outcome.condensed {
                eprintln!("🗜  Older messages were condensed into a summary");
            }
        }
        Err(err) => eprintln!("❌ {err}"),
    }
}

pub(crate) fn toggle(current: bool, requested: Option<bool>) -> bool {
    requested.unwrap_or(!current)
}

pub(crate) fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

async fn list_models_for(ctx: &AppContext, engine: &Engine, current: &str) {
    let models = engine
        .adapter()
        .fetch_available_models(ctx.client.http(), ModelTask::Chat, ctx.client.timeout())
        .await;
    if models.is_empty() {
        eprintln!("No models available (current: {current})");
        return;
    }
    for model in models {
        let marker = if model == current { " (current)" } else { "" };
        println!("  {model}{marker}");
    }
}

fn print_state(session: &ChatSession) {
    let state = session.state();
    println!("Engine:      {}", session.provider().display_name());
    println!("Model:       {}", state.model);
    println!("Streaming:   {}", on_off(state.stream));
    println!("Max tokens:  {}", format_max_tokens(state.max_tokens));
    println!("Messages:    {}", state.history.len());
    println!(
        "System:      {}",
        if state.system_prompt.is_some() { "set" } else { "none" }
    );
    println!(
        "Memory:      {}",
        if session.settings().memory_enabled && state.memory.is_some() {
            "loaded"
        } else {
            "off"
        }
    );
    println!("Files:       {}", state.attachments.len());
    println!(
        "Images:      {}{}",
        state.images.len(),
        if state.images_sent && !state.images.is_empty() {
            " (sent)"
        } else {
            ""
        }
    );
    println!("Last turn:   {}", state.last_turn_usage.summary());
    println!(
        "Session:     {} prompt / {} completion",
        state.totals.prompt, state.totals.completion
    );
    if let Some(persona) = &state.persona {
        println!("Persona:     {} ({})", persona.name, persona.id);
    }
    if let Some(path) = session.transcript_path() {
        println!("Transcript:  {}", path.display());
    }
}

async fn remember(ctx: &AppContext, session: &mut ChatSession, fact: Option<String>) {
    let store = memory_store(ctx);
    let Some(existing) = existing_memory(&store) else {
        return;
    };
    let updated = match fact {
        Some(fact) => session.inject_memory(&existing, &fact).await,
        None if session.history().is_empty() => {
            println!("Nothing to consolidate; history is empty.");
            return;
        }
        None => session.consolidate_memory(&existing).await,
    };
    if let Some(updated) = store_memory(&store, updated) {
        if session.settings().memory_enabled {
            session.set_memory(&updated);
        }
    }
}

fn print_personas(ctx: &AppContext) {
    let personas = list_personas(&ctx.paths.persona_dir());
    if personas.is_empty() {
        println!("No personas found in {}", ctx.paths.persona_dir().display());
        return;
    }
    println!("Available personas:");
    for file in personas {
        println!("  {}: {}", file.id, file.persona.description);
    }
}

fn switch_persona(ctx: &AppContext, session: &mut ChatSession, name: &str) {
    if name.eq_ignore_ascii_case("clear") {
        match session.clear_persona() {
            Some(old) => println!("Persona '{}' cleared", old.name),
            None => println!("No active persona to clear."),
        }
        return;
    }

    let file = match load_persona(&ctx.paths.persona_dir(), name) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("❌ {err}");
            return;
        }
    };
    let attachments = match persona_attachments(&file) {
        Ok(attachments) => attachments,
        Err(err) => {
            eprintln!("❌ {err}");
            return;
        }
    };
    if let Some(target) = file.persona.engine.filter(|target| *target != session.provider()) {
        match Engine::from_env(target) {
            Ok(engine) => {
                session.switch_engine(engine, ctx.config.chat_model(target));
                println!("Switched to {} for this persona", target.display_name());
            }
            Err(err) => {
                err.print();
                return;
            }
        }
    }
    let attached = attachments.len();
    session.apply_persona(&file, attachments);
    println!(
        "Switched to persona '{}' ({})",
        file.persona.name,
        session.state().model
    );
    if attached > 0 {
        println!("Attached {attached} file(s) from the persona");
    }
}

async fn run_command(
    ctx: &AppContext,
    session: &mut ChatSession,
    command: SlashCommand,
) -> Flow {
    debug!(?command, "slash command");
    match command {
        SlashCommand::Help => println!("{}", help_text(CommandMode::Single)),
        SlashCommand::Exit(name) => return Flow::Exit(Leave::WrapUp(name)),
        SlashCommand::Quit => return Flow::Exit(Leave::Quietly),
        SlashCommand::Stream(requested) => {
            let state = session.state_mut();
            state.stream = toggle(state.stream, requested);
            println!("Streaming {}", on_off(state.stream));
        }
        SlashCommand::Debug(requested) => {
            let recorder = ctx.client.recorder();
            let enabled = toggle(recorder.is_debug(), requested);
            recorder.set_debug(enabled);
            println!("Debug logging {}", on_off(enabled));
        }
        SlashCommand::MaxTokens(None) => {
            println!("Max tokens: {}", format_max_tokens(session.state().max_tokens));
        }
        SlashCommand::MaxTokens(Some(limit)) => {
            session.state_mut().max_tokens = limit;
            println!("Max tokens set to {}", format_max_tokens(limit));
        }
        SlashCommand::Model(None) => {
            let current = session.state().model.clone();
            list_models_for(ctx, session.engine(), &current).await;
        }
        SlashCommand::Model(Some(model)) => {
            println!("Model set to {model}");
            session.set_model(model);
        }
        SlashCommand::ModelFor { .. } => {
            eprintln!("That form of /model is only available in multichat");
        }
        SlashCommand::Engine(requested) => {
            let target = requested.unwrap_or_else(|| session.provider().other());
            if target == session.provider() {
                println!("Already using {}", target.display_name());
                return Flow::Continue;
            }
            match Engine::from_env(target) {
                Ok(engine) => {
                    let model = ctx.config.chat_model(target);
                    session.switch_engine(engine, model);
                    println!(
                        "Switched to {} ({})",
                        target.display_name(),
                        session.state().model
                    );
                }
                Err(err) => err.print(),
            }
        }
        SlashCommand::History => print_history(session.history()),
        SlashCommand::State => print_state(session),
        SlashCommand::Forget(pairs) => {
            let removed = session.forget(pairs);
            println!("Removed {removed} messages");
        }
        SlashCommand::Clear => {
            session.clear();
            println!("History cleared");
        }
        SlashCommand::Save {
            name,
            stay,
            remember,
        } => {
            let path = snapshot_path(&ctx.paths.session_dir(), &name);
            let snapshot = SessionSnapshot::Single(session.state().clone());
            match save_snapshot(&path, &snapshot) {
                Ok(()) => {
                    println!("✅ Session saved to {}", path.display());
                    if !stay {
                        return Flow::Exit(leave_after_save(remember));
                    }
                }
                Err(err) => eprintln!("❌ {err}"),
            }
        }
        SlashCommand::Load(name) => load_into(ctx, session, &name),
        SlashCommand::Image(prompt) => generate_for_session(ctx, session, &prompt).await,
        SlashCommand::Memory => show_memory(ctx),
        SlashCommand::Remember(fact) => remember(ctx, session, fact).await,
        SlashCommand::Persona(name) => switch_persona(ctx, session, &name),
        SlashCommand::Personas => print_personas(ctx),
    }
    Flow::Continue
}

/// Leaving through `/save` skips the wrap-up unless `--remember` was given.
pub(crate) fn leave_after_save(remember: bool) -> Leave {
    if remember {
        Leave::WrapUp(None)
    } else {
        Leave::Quietly
    }
}

fn load_into(ctx: &AppContext, session: &mut ChatSession, name: &str) {
    let path = snapshot_path(&ctx.paths.session_dir(), name);
    let state = match load_single(&path) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("❌ {err}");
            return;
        }
    };
    let engine = match Engine::from_env(state.engine_name) {
        Ok(engine) => engine,
        Err(err) => {
            err.print();
            return;
        }
    };
    let backend: Arc<dyn ChatBackend> = Arc::new(ctx.client.clone());
    let messages = state.history.len();
    let settings = session.settings().clone();
    let mut restored = ChatSession::from_state(backend, engine, state, settings);
    if let Some(path) = session.transcript_path().map(PathBuf::from) {
        restored = restored.with_transcript(TranscriptLog::new(path));
    }
    *session = restored;
    println!(
        "📂 Loaded {} ({} messages, {} / {})",
        name,
        messages,
        session.provider().display_name(),
        session.state().model
    );
}

async fn generate_for_session(ctx: &AppContext, session: &mut ChatSession, prompt: &str) {
    let engine = if session.provider() == Provider::OpenAi {
        session.engine().clone()
    } else {
        match Engine::from_env(Provider::OpenAi) {
            Ok(engine) => engine,
            Err(err) => {
                err.print();
                return;
            }
        }
    };

    eprintln!("🎨 Generating image...");
    let bytes = match generate_image(
        ctx.client.http(),
        engine.base_url(),
        engine.api_key(),
        &ctx.config.image_model(),
        prompt,
        ctx.client.timeout(),
    )
    .await
    {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("❌ Image generation failed: {err}");
            return;
        }
    };
    match save_image(&ctx.paths.image_dir(), prompt, &bytes) {
        Ok(path) => {
            println!("🖼  Image saved to {}", path.display());
            session.note_generated_image(prompt, &path);
        }
        Err(err) => eprintln!("❌ Could not save image: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_flip_or_follow_request() {
        assert!(!toggle(true, None));
        assert!(toggle(false, None));
        assert!(toggle(true, Some(true)));
        assert!(!toggle(true, Some(false)));
    }

    #[test]
    fn saving_skips_the_wrap_up_unless_asked() {
        assert_eq!(leave_after_save(false), Leave::Quietly);
        assert_eq!(leave_after_save(true), Leave::WrapUp(None));
    }

    #[test]
    fn persona_files_are_read_up_front() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("style.md"), "Use short words.").unwrap();
        let mut file = PersonaFile {
            id: "plain".into(),
            persona: serde_json::from_str(r#"{"name": "Plain", "system_prompt": "p"}"#).unwrap(),
        };
        file.persona.attachments = vec![dir.path().join("style.md")];

        let attachments = persona_attachments(&file).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].content, "Use short words.");

        file.persona.attachments.push(dir.path().join("missing.md"));
        assert!(matches!(
            persona_attachments(&file),
            Err(AttachmentError::Read { .. })
        ));
    }
}
