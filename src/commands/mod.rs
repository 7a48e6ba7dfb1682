//! Slash commands typed into the interactive loops.
//!
//! Parsing is separate from execution: [`parse_input`] turns a line into a
//! [`ParsedInput`], and the chat loops in [`crate::cli`] act on it.

mod registry;

pub use registry::{all_commands, help_text, CommandMode};

use crate::core::provider::Provider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    /// Leave with the usual wrap-up; a name replaces the suggested
    /// transcript name.
    Exit(Option<String>),
    /// Leave without updating memory or renaming the transcript.
    Quit,
    /// `None` toggles.
    Stream(Option<bool>),
    /// `None` toggles.
    Debug(Option<bool>),
    /// `None` shows the current limit; `Some(None)` removes it.
    MaxTokens(Option<Option<u32>>),
    /// `None` lists available models.
    Model(Option<String>),
    ModelFor { provider: Provider, model: String },
    /// `None` switches to the other provider.
    Engine(Option<Provider>),
    History,
    State,
    Forget(usize),
    Clear,
    Save {
        name: String,
        stay: bool,
        /// Run the exit wrap-up as well when leaving.
        remember: bool,
    },
    Load(String),
    Image(String),
    Memory,
    /// `None` folds the conversation into memory; `Some` adds one fact.
    Remember(Option<String>),
    /// A persona id, or `clear`.
    Persona(String),
    Personas,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    /// Text for the model(s).
    Message(String),
    Command(SlashCommand),
    /// A known command with bad arguments; carries the usage line.
    Invalid(&'static str),
    Unknown(String),
}

fn parse_toggle(args: &str) -> Result<Option<bool>, ()> {
    match args.to_lowercase().as_str() {
        "" => Ok(None),
        "on" | "true" | "yes" => Ok(Some(true)),
        "off" | "false" | "no" => Ok(Some(false)),
        _ => Err(()),
    }
}

fn parse_max_tokens(args: &str) -> Result<Option<Option<u32>>, ()> {
    match args.to_lowercase().as_str() {
        "" => Ok(None),
        "off" | "none" | "0" => Ok(Some(None)),
        number => number.parse::<u32>().map(|n| Some(Some(n))).map_err(|_| ()),
    }
}

fn non_empty(args: &str) -> Result<String, ()> {
    if args.is_empty() {
        Err(())
    } else {
        Ok(args.to_string())
    }
}

pub fn parse_input(input: &str, mode: CommandMode) -> ParsedInput {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return ParsedInput::Message(input.to_string());
    }
    // `/ai` addressing belongs to the multichat coordinator.
    if mode == CommandMode::Multichat && trimmed.to_lowercase().starts_with("/ai") {
        return ParsedInput::Message(input.to_string());
    }

    let mut parts = trimmed[1..].splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").to_lowercase();
    let args = parts.next().unwrap_or("").trim();

    let Some(command) = registry::find_command(&name, mode) else {
        return ParsedInput::Unknown(format!("/{name}"));
    };

    let parsed = match (name.as_str(), mode) {
        ("help", _) => Ok(SlashCommand::Help),
        ("exit", _) => Ok(SlashCommand::Exit(
            Some(args.to_string()).filter(|name| !name.is_empty()),
        )),
        ("quit", _) => Ok(SlashCommand::Quit),
        ("stream", _) => parse_toggle(args).map(SlashCommand::Stream),
        ("debug", _) => parse_toggle(args).map(SlashCommand::Debug),
        ("max-tokens", _) => parse_max_tokens(args).map(SlashCommand::MaxTokens),
        ("model", CommandMode::Single) => {
            Ok(SlashCommand::Model(Some(args.to_string()).filter(|m| !m.is_empty())))
        }
        ("model", CommandMode::Multichat) => {
            let mut words = args.split_whitespace();
            match (words.next().map(str::parse::<Provider>), words.next(), words.next()) {
                (Some(Ok(provider)), Some(model), None) => Ok(SlashCommand::ModelFor {
                    provider,
                    model: model.to_string(),
                }),
                _ => Err(()),
            }
        }
        ("engine", _) if args.is_empty() => Ok(SlashCommand::Engine(None)),
        ("engine", _) => args
            .parse::<Provider>()
            .map(|p| SlashCommand::Engine(Some(p)))
            .map_err(|_| ()),
        ("history", _) => Ok(SlashCommand::History),
        ("state", _) => Ok(SlashCommand::State),
        ("forget", _) if args.is_empty() => Ok(SlashCommand::Forget(1)),
        ("forget", _) => args
            .parse::<usize>()
            .map(SlashCommand::Forget)
            .map_err(|_| ()),
        ("clear", _) => Ok(SlashCommand::Clear),
        ("save", _) => {
            let mut stay = false;
            let mut remember = false;
            let mut words = Vec::new();
            for word in args.split_whitespace() {
                match word {
                    "--stay" => stay = true,
                    "--remember" => remember = true,
                    _ => words.push(word),
                }
            }
            non_empty(&words.join(" ")).map(|name| SlashCommand::Save {
                name,
                stay,
                remember,
            })
        }
        ("load", _) => non_empty(args).map(SlashCommand::Load),
        ("image", _) => non_empty(args).map(SlashCommand::Image),
        ("memory", _) => Ok(SlashCommand::Memory),
        ("remember", _) => Ok(SlashCommand::Remember(
            Some(args.to_string()).filter(|fact| !fact.is_empty()),
        )),
        ("persona", _) => non_empty(args).map(SlashCommand::Persona),
        ("personas", _) => Ok(SlashCommand::Personas),
        _ => Err(()),
    };

    match parsed {
        Ok(command) => ParsedInput::Command(command),
        Err(()) => ParsedInput::Invalid(command.usage),
    }
}
