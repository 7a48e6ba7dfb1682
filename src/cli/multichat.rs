//! Interactive three-way conversation with OpenAI and Gemini.

use std::error::Error;
use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::chat::{
    exit_with, existing_memory, leave_after_save, memory_store, on_off, persona_attachments,
    show_memory, store_memory, toggle, Leave,
};
use crate::cli::display::{format_max_tokens, print_history, print_usage, LabelledStdout};
use crate::cli::{
    cancel_on_ctrl_c, engine_or_exit, read_input, resolve_provider, stdin_lines, AppContext,
    MultichatArgs,
};
use crate::commands::{help_text, parse_input, CommandMode, ParsedInput, SlashCommand};
use crate::core::api_client::ChatBackend;
use crate::core::multichat::{MultiChatSession, MultiChatSettings, TurnAddress};
use crate::core::persona::{load_persona, PersonaFile};
use crate::core::provider::Provider;
use crate::core::session::assemble_system_prompt;
use crate::core::snapshot::{load_multichat, save_snapshot, snapshot_path, SessionSnapshot};
use crate::utils::formatters::{file_timestamp, sanitize_filename};
use crate::utils::input::{load_image, sanitize_text_input};
use crate::utils::logging::TranscriptLog;

/// Which provider's reply streams to the terminal for `input`.
fn foreground_provider(input: &str, primary: Provider) -> Provider {
    match TurnAddress::parse(input) {
        Ok(TurnAddress::Targeted { provider, .. }) => provider,
        _ => primary,
    }
}

/// A persona's prompt with its files folded in, for one side of the
/// conversation.
fn persona_prompt(file: &PersonaFile) -> Option<String> {
    let attachments = persona_attachments(file).unwrap_or_else(|err| exit_with(err));
    assemble_system_prompt(Some(&file.persona.system_prompt), None, &attachments)
}

/// Model for one side: the flag, then the persona, then the configured default.
fn side_model(
    ctx: &AppContext,
    provider: Provider,
    flag: &Option<String>,
    persona: Option<&PersonaFile>,
) -> String {
    flag.clone()
        .or_else(|| persona.and_then(|file| file.persona.model.clone()))
        .unwrap_or_else(|| ctx.config.chat_model(provider))
}

fn build_session(ctx: &AppContext, options: &MultichatArgs) -> (MultiChatSession, String) {
    let primary = resolve_provider(options.primary.as_deref(), &ctx.config)
        .unwrap_or_else(|err| exit_with(err));
    let openai = engine_or_exit(Provider::OpenAi);
    let gemini = engine_or_exit(Provider::Gemini);
    let persona_dir = ctx.paths.persona_dir();
    let load = |name: &Option<String>| {
        name.as_deref()
            .map(|name| load_persona(&persona_dir, name).unwrap_or_else(|err| exit_with(err)))
    };
    let persona_gpt = load(&options.persona_gpt);
    let persona_gem = load(&options.persona_gem);

    let max_tokens = match options.max_tokens {
        Some(limit) => (limit > 0).then_some(limit),
        None => Some(ctx.config.default_max_tokens()),
    };
    let settings = MultiChatSettings {
        primary,
        openai_model: side_model(
            ctx,
            Provider::OpenAi,
            &options.openai_model,
            persona_gpt.as_ref(),
        ),
        gemini_model: side_model(
            ctx,
            Provider::Gemini,
            &options.gemini_model,
            persona_gem.as_ref(),
        ),
        stream: ctx.config.stream() && !options.no_stream,
        max_tokens,
        openai_persona: persona_gpt.as_ref().and_then(persona_prompt),
        gemini_persona: persona_gem.as_ref().and_then(persona_prompt),
        helper_model_openai: ctx.config.helper_model(Provider::OpenAi),
        helper_model_gemini: ctx.config.helper_model(Provider::Gemini),
    };

    let images = options
        .images
        .iter()
        .map(|path| load_image(path).unwrap_or_else(|err| exit_with(err)))
        .collect();
    let backend: Arc<dyn ChatBackend> = Arc::new(ctx.client.clone());
    let mut session =
        MultiChatSession::new(backend, openai, gemini, settings).with_images(images);

    let stem = match &options.load {
        Some(name) => {
            let path = snapshot_path(&ctx.paths.session_dir(), name);
            let state = load_multichat(&path).unwrap_or_else(|err| exit_with(err));
            session.restore(state);
            if options.no_stream {
                session.set_stream(false);
            }
            if options.max_tokens.is_some() {
                session.set_max_tokens(max_tokens);
            }
            sanitize_filename(name, 100)
        }
        None => format!("multichat_{}", file_timestamp(Local::now())),
    };
    (session, stem)
}

pub async fn run_multichat(
    ctx: &AppContext,
    options: MultichatArgs,
) -> Result<(), Box<dyn Error>> {
    let (session, stem) = build_session(ctx, &options);
    let transcript_path = ctx.paths.chatlog_dir().join(format!("{stem}.jsonl"));
    let mut session = session.with_transcript(TranscriptLog::new(transcript_path));

    eprintln!(
        "🚀 aiterm multichat: {} ({}) and {} ({}), {} leads",
        Provider::OpenAi.display_name(),
        session.model(Provider::OpenAi),
        Provider::Gemini.display_name(),
        session.model(Provider::Gemini),
        session.settings().primary.display_name()
    );
    eprintln!("💡 Messages go to both models. Use /ai <gpt|gem> to address one, /help for more");

    let mut first_turn = session.history().is_empty();
    let mut leave = Leave::WrapUp(None);
    let mut lines = stdin_lines();
    while let Some(line) = read_input(&mut lines, "Director: ").await? {
        match parse_input(&line, CommandMode::Multichat) {
            ParsedInput::Message(text) => {
                let text = sanitize_text_input(&text);
                if text.trim().is_empty() {
                    continue;
                }
                if send_turn(&mut session, &text, first_turn).await {
                    first_turn = false;
                }
            }
            ParsedInput::Command(command) => match command {
                SlashCommand::Exit(name) => {
                    leave = Leave::WrapUp(name);
                    break;
                }
                SlashCommand::Quit => {
                    leave = Leave::Quietly;
                    break;
                }
                SlashCommand::Clear => {
                    session.clear();
                    first_turn = true;
                    println!("History cleared");
                }
                SlashCommand::Save {
                    name,
                    stay,
                    remember,
                } => {
                    let path = snapshot_path(&ctx.paths.session_dir(), &name);
                    let snapshot = SessionSnapshot::Multichat(session.snapshot());
                    match save_snapshot(&path, &snapshot) {
                        Ok(()) => {
                            println!("✅ Session saved to {}", path.display());
                            if !stay {
                                leave = leave_after_save(remember);
                                break;
                            }
                        }
                        Err(err) => eprintln!("❌ {err}"),
                    }
                }
                other => run_command(ctx, &mut session, other).await,
            },
            ParsedInput::Invalid(usage) => eprintln!("{usage}"),
            ParsedInput::Unknown(name) => {
                eprintln!("Unknown command: {name}. Type /help for a list.")
            }
        }
    }

    // Multichat conversations never feed the persistent memory on exit; only
    // an explicit name renames the transcript.
    if let Leave::WrapUp(Some(name)) = leave {
        rename_transcript(&mut session, &name);
    }
    if let Some(path) = session.transcript_path().filter(|path| path.exists()) {
        eprintln!("💾 Transcript: {}", path.display());
    }
    ctx.save_debug_log(&stem);
    Ok(())
}

/// Run one director turn. Returns whether anything was recorded.
async fn send_turn(session: &mut MultiChatSession, text: &str, first_turn: bool) -> bool {
    let streaming_provider = foreground_provider(text, session.settings().primary);
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);
    let mut sink = LabelledStdout::new(streaming_provider.display_name());
    let result = session.process_turn(text, first_turn, &mut sink, &cancel).await;
    watcher.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(usage) => {
            eprintln!("{usage}");
            return false;
        }
    };

    let streamed_text = sink.started();
    if streamed_text {
        println!();
    }
    for reply in &outcome.replies {
        let already_shown = streamed_text && reply.streamed && reply.provider == streaming_provider;
        if already_shown {
            continue;
        }
        println!("{}: {}", reply.provider.display_name(), reply.text);
    }
    println!();
    print_usage(&outcome.last_turn_usage, &session.totals());
    true
}

fn rename_transcript(session: &mut MultiChatSession, name: &str) {
    if !session.transcript_path().is_some_and(|path| path.exists()) {
        return;
    }
    let stem = sanitize_filename(name, 100);
    if let Err(err) = session.rename_transcript(&stem) {
        warn!(%stem, error = %err, "could not rename the transcript");
    }
}

async fn remember(ctx: &AppContext, session: &MultiChatSession, fact: Option<String>) {
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
    store_memory(&store, updated);
}

async fn run_command(ctx: &AppContext, session: &mut MultiChatSession, command: SlashCommand) {
    debug!(?command, "multichat command");
    match command {
        SlashCommand::Help => println!("{}", help_text(CommandMode::Multichat)),
        SlashCommand::Debug(requested) => {
            let recorder = ctx.client.recorder();
            let enabled = toggle(recorder.is_debug(), requested);
            recorder.set_debug(enabled);
            println!("Debug logging {}", on_off(enabled));
        }
        SlashCommand::MaxTokens(None) => {
            println!("Max tokens: {}", format_max_tokens(session.settings().max_tokens));
        }
        SlashCommand::MaxTokens(Some(limit)) => {
            session.set_max_tokens(limit);
            println!("Max tokens set to {}", format_max_tokens(limit));
        }
        SlashCommand::ModelFor { provider, model } => {
            println!("{} model set to {model}", provider.display_name());
            session.set_model(provider, model);
        }
        SlashCommand::History => print_history(session.history()),
        SlashCommand::State => {
            let settings = session.settings();
            println!("Primary:     {}", settings.primary.display_name());
            println!("OpenAI:      {}", settings.openai_model);
            println!("Gemini:      {}", settings.gemini_model);
            println!("Streaming:   {}", on_off(settings.stream));
            println!("Max tokens:  {}", format_max_tokens(settings.max_tokens));
            let persona = |prompt: &Option<String>| if prompt.is_some() { "yes" } else { "no" };
            println!(
                "Personas:    OpenAI {} / Gemini {}",
                persona(&settings.openai_persona),
                persona(&settings.gemini_persona)
            );
            println!("Messages:    {}", session.history().len());
            println!("Last turn:   {}", session.last_turn_usage().summary());
            let totals = session.totals();
            println!(
                "Session:     {} prompt / {} completion",
                totals.prompt, totals.completion
            );
        }
        SlashCommand::Memory => show_memory(ctx),
        SlashCommand::Remember(fact) => remember(ctx, session, fact).await,
        _ => eprintln!("That command is not available in multichat"),
    }
}
