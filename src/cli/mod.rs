//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod display;
pub mod image;
pub mod model_list;
pub mod multichat;
pub mod replay;
pub mod say;
pub mod settings;

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::api::models::ModelTask;
use crate::cli::settings::{run_set, run_unset, SetContext, SettingRegistry};
use crate::core::api_client::{ApiClient, RawLogRecorder, RAW_LOG_BACKUPS, RAW_LOG_MAX_BYTES};
use crate::core::config::{AppPaths, Config};
use crate::core::credentials::load_dotenv;
use crate::core::engine::Engine;
use crate::core::provider::Provider;
use crate::utils::logging::RotatingFile;

#[derive(Parser)]
#[command(name = "aiterm", version)]
#[command(about = "A command-line chat client for OpenAI and Gemini")]
#[command(
    long_about = "aiterm is a line-oriented chat client for the OpenAI and Gemini APIs. \
It streams replies, keeps a per-session transcript, and can hold a three-way \
conversation between you and both providers.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Your OpenAI API key\n\
  GEMINI_API_KEY    Your Gemini API key\n\
  RUST_LOG          Log filter for diagnostics written to stderr\n\n\
Keys are also read from a .env file in the configuration directory.\n\n\
Controls:\n\
  Enter             Send the message\n\
  Ctrl+C            Cancel the reply in progress, or quit at the prompt\n\
  /help             List the slash commands of the current mode"
)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub chat: ChatArgs,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ChatArgs {
    /// Provider to talk to (openai or gemini)
    #[arg(short = 'e', long, value_name = "ENGINE")]
    pub engine: Option<String>,

    /// Model to use instead of the configured default
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// System prompt for the session
    #[arg(short = 's', long, value_name = "TEXT")]
    pub system: Option<String>,

    /// Text file to include in the system prompt (repeatable)
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Image to send with the first message (repeatable)
    #[arg(short = 'i', long = "image", value_name = "PATH")]
    pub images: Vec<PathBuf>,

    /// Response token limit; 0 leaves it to the provider
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Wait for whole replies instead of streaming them
    #[arg(long)]
    pub no_stream: bool,

    /// Log raw requests and save a debug log on exit
    #[arg(long)]
    pub debug: bool,

    /// Resume a saved session by name
    #[arg(long, value_name = "NAME")]
    pub load: Option<String>,

    /// Start with a persona from the personas directory
    #[arg(short = 'P', long, value_name = "NAME")]
    pub persona: Option<String>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct MultichatArgs {
    /// Provider whose reply streams in the foreground
    #[arg(long, value_name = "ENGINE")]
    pub primary: Option<String>,

    #[arg(long, value_name = "MODEL")]
    pub openai_model: Option<String>,

    #[arg(long, value_name = "MODEL")]
    pub gemini_model: Option<String>,

    /// Image to send with the first turn (repeatable)
    #[arg(short = 'i', long = "image", value_name = "PATH")]
    pub images: Vec<PathBuf>,

    /// Response token limit; 0 leaves it to the providers
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub no_stream: bool,

    #[arg(long)]
    pub debug: bool,

    /// Resume a saved multichat session by name
    #[arg(long, value_name = "NAME")]
    pub load: Option<String>,

    /// Persona for the OpenAI side of the conversation
    #[arg(long, value_name = "NAME")]
    pub persona_gpt: Option<String>,

    /// Persona for the Gemini side of the conversation
    #[arg(long, value_name = "NAME")]
    pub persona_gem: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat(ChatArgs),
    /// Send one prompt, print the reply, and exit
    Say {
        #[command(flatten)]
        options: ChatArgs,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// Talk to OpenAI and Gemini in the same conversation
    Multichat(MultichatArgs),
    /// List the models a provider offers
    Models {
        #[arg(short = 'e', long, value_name = "ENGINE")]
        engine: Option<String>,
        /// chat or image
        #[arg(long, default_value = "chat")]
        task: ModelTask,
    },
    /// Generate an image with OpenAI and save it
    Image {
        #[arg(short = 'm', long, value_name = "MODEL")]
        model: Option<String>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// Print a saved transcript or session
    Replay {
        file: PathBuf,
    },
    /// Set configuration values, or show them all
    Set {
        /// Configuration key to set
        key: Option<String>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

impl Args {
    fn debug_requested(&self) -> bool {
        match &self.command {
            None => self.chat.debug,
            Some(Commands::Chat(args)) | Some(Commands::Say { options: args, .. }) => args.debug,
            Some(Commands::Multichat(args)) => args.debug,
            _ => false,
        }
    }
}

/// Everything a command needs that is set up once per process.
pub struct AppContext {
    pub paths: AppPaths,
    pub config: Config,
    pub client: ApiClient,
}

impl AppContext {
    pub fn load(debug: bool) -> Result<Self, Box<dyn Error>> {
        let paths = AppPaths::discover()?;
        paths.ensure_dirs()?;
        load_dotenv(&paths.dotenv_file());
        let config = Config::load(&paths)?;

        let raw_log = RotatingFile::new(paths.raw_log_file(), RAW_LOG_MAX_BYTES, RAW_LOG_BACKUPS);
        let recorder = RawLogRecorder::new(Some(raw_log), debug);
        let client = ApiClient::new(config.api_timeout(), recorder);

        Ok(Self {
            paths,
            config,
            client,
        })
    }

    /// Write the raw request log collected this session, if debug was on.
    pub fn save_debug_log(&self, stem: &str) {
        let path = self.paths.log_dir().join(format!("debug_{stem}.jsonl"));
        match self.client.recorder().save_session_log(&path) {
            Ok(true) => eprintln!("📝 Debug log saved to {}", path.display()),
            Ok(false) => {}
            Err(err) => eprintln!("⚠️  Could not save debug log: {err}"),
        }
    }
}

/// Resolve an `--engine` style argument, falling back to the configured default.
pub fn resolve_provider(arg: Option<&str>, config: &Config) -> Result<Provider, String> {
    match arg {
        None => Ok(config.default_engine()),
        Some(name) => Provider::from_alias(name).ok_or_else(|| {
            format!("Unknown engine '{name}'. Expected 'openai' or 'gemini'.")
        }),
    }
}

/// The engine for `provider`, or exit with setup instructions.
pub fn engine_or_exit(provider: Provider) -> Engine {
    match Engine::from_env(provider) {
        Ok(engine) => engine,
        Err(err) => {
            err.print();
            std::process::exit(1);
        }
    }
}

/// Cancel `token` when Ctrl-C arrives. Abort the handle once the guarded
/// work is done so the next prompt can see Ctrl-C itself.
pub fn cancel_on_ctrl_c(token: &CancellationToken) -> JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

pub type InputLines = Lines<BufReader<Stdin>>;

pub fn stdin_lines() -> InputLines {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Print `prompt` and wait for a line. `None` on end of input or Ctrl-C.
pub async fn read_input(lines: &mut InputLines, prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    tokio::select! {
        line = lines.next_line() => line,
        _ = tokio::signal::ctrl_c() => {
            println!();
            Ok(None)
        }
    }
}

fn init_tracing(debug: bool) {
    let default_directives = if debug {
        "warn,aiterm=debug,aiterm::raw=info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.debug_requested());

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let debug = args.debug_requested();
    let command = args.command.unwrap_or(Commands::Chat(args.chat));

    if let Commands::Replay { file } = &command {
        return replay::run_replay(file);
    }

    let ctx = match AppContext::load(debug) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("❌ Could not load configuration: {err}");
            std::process::exit(1);
        }
    };

    match command {
        Commands::Chat(options) => chat::run_chat(&ctx, options).await,
        Commands::Say { options, prompt } => say::run_say(&ctx, options, prompt).await,
        Commands::Multichat(options) => multichat::run_multichat(&ctx, options).await,
        Commands::Models { engine, task } => {
            model_list::list_models(&ctx, engine.as_deref(), task).await
        }
        Commands::Image { model, prompt } => image::run_image(&ctx, model, prompt).await,
        Commands::Replay { .. } => Ok(()),
        Commands::Set { key, value } => {
            let registry = SettingRegistry::new();
            let set_ctx = SetContext {
                config: &ctx.config,
                paths: &ctx.paths,
            };
            match run_set(&registry, &set_ctx, key.as_deref(), &value) {
                Ok(message) => {
                    println!("{message}");
                    Ok(())
                }
                Err(err) => {
                    err.print();
                    std::process::exit(err.exit_code());
                }
            }
        }
        Commands::Unset { key } => {
            let registry = SettingRegistry::new();
            let set_ctx = SetContext {
                config: &ctx.config,
                paths: &ctx.paths,
            };
            match run_unset(&registry, &set_ctx, &key) {
                Ok(message) => {
                    println!("{message}");
                    Ok(())
                }
                Err(err) => {
                    err.print();
                    std::process::exit(err.exit_code());
                }
            }
        }
    }
}
