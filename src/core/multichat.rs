//! Two-provider conversations directed by the user.
//!
//! Every line is either broadcast to both providers or addressed to one of
//! them with `/ai <gpt|gem> [text]`. History is kept in the OpenAI shape with
//! each reply tagged by the provider that wrote it, and is translated per
//! provider before each call so each model sees the other's words as quoted
//! user text.
//!
//! In a broadcast the secondary provider runs in a spawned task while the
//! primary streams in the foreground. Replies are placed OpenAI first, then
//! Gemini, regardless of which one finished first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::api_client::{ChatBackend, ChatRequest};
use crate::core::chat_stream::{NullSink, StreamEnd, StreamSink};
use crate::core::engine::Engine;
use crate::core::error::HelperError;
use crate::core::helper::HelperClient;
use crate::core::message::{ImageAttachment, Turn};
use crate::core::prompts::{multichat_system_prompt, CONTINUATION_PROMPT};
use crate::core::provider::Provider;
use crate::core::translate::{
    clean_response_text, construct_assistant_message, construct_user_message, translate_history,
};
use crate::core::usage::{TokenTotals, TokenUsage};
use crate::utils::logging::TranscriptLog;

pub const AI_USAGE: &str = "Usage: /ai <gpt|gem> [prompt]";

/// Who a line of input is meant for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnAddress {
    Broadcast(String),
    Targeted { provider: Provider, prompt: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnAddressError;

impl fmt::Display for TurnAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(AI_USAGE)
    }
}

impl std::error::Error for TurnAddressError {}

impl TurnAddress {
    pub fn parse(input: &str) -> Result<Self, TurnAddressError> {
        let trimmed = input.trim_start();
        if !trimmed.to_lowercase().starts_with("/ai") {
            return Ok(TurnAddress::Broadcast(input.to_string()));
        }

        let mut parts = trimmed.splitn(3, ' ');
        parts.next();
        let provider = parts
            .next()
            .and_then(Provider::from_alias)
            .ok_or(TurnAddressError)?;
        let prompt = parts
            .next()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(CONTINUATION_PROMPT)
            .to_string();
        Ok(TurnAddress::Targeted { provider, prompt })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiChatSettings {
    /// Streams in the foreground during broadcasts.
    pub primary: Provider,
    pub openai_model: String,
    pub gemini_model: String,
    pub stream: bool,
    pub max_tokens: Option<u32>,
    /// Persona prompts appended to each provider's system prompt.
    pub openai_persona: Option<String>,
    pub gemini_persona: Option<String>,
    pub helper_model_openai: String,
    pub helper_model_gemini: String,
}

/// What the background call hands back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReply {
    pub provider: Provider,
    pub text: String,
    pub usage: TokenUsage,
}

/// One provider's contribution to a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    pub provider: Provider,
    pub text: String,
    pub usage: TokenUsage,
    /// Whether the text was streamed to the sink already.
    pub streamed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiTurnOutcome {
    /// Replies in history order.
    pub replies: Vec<ProviderReply>,
    pub last_turn_usage: TokenUsage,
}

/// Saved form of a multichat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiChatState {
    pub primary: Provider,
    pub openai_model: String,
    pub gemini_model: String,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub totals: TokenTotals,
    #[serde(default)]
    pub last_turn_usage: TokenUsage,
    pub stream: bool,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub openai_persona: Option<String>,
    #[serde(default)]
    pub gemini_persona: Option<String>,
}

pub struct MultiChatSession {
    backend: Arc<dyn ChatBackend>,
    openai: Engine,
    gemini: Engine,
    settings: MultiChatSettings,
    images: Vec<ImageAttachment>,
    history: Vec<Turn>,
    totals: TokenTotals,
    last_turn_usage: TokenUsage,
    transcript: Option<TranscriptLog>,
}

fn error_text(message: impl fmt::Display) -> String {
    format!("Error: {message}")
}

impl MultiChatSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        openai: Engine,
        gemini: Engine,
        settings: MultiChatSettings,
    ) -> Self {
        Self {
            backend,
            openai,
            gemini,
            settings,
            images: Vec::new(),
            history: Vec::new(),
            totals: TokenTotals::default(),
            last_turn_usage: TokenUsage::default(),
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, transcript: TranscriptLog) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }

    pub fn restore(&mut self, state: MultiChatState) {
        self.settings.primary = state.primary;
        self.settings.openai_model = state.openai_model;
        self.settings.gemini_model = state.gemini_model;
        self.settings.stream = state.stream;
        self.settings.max_tokens = state.max_tokens;
        self.settings.openai_persona = state.openai_persona;
        self.settings.gemini_persona = state.gemini_persona;
        self.history = state.history;
        self.totals = state.totals;
        self.last_turn_usage = state.last_turn_usage;
    }

    pub fn snapshot(&self) -> MultiChatState {
        MultiChatState {
            primary: self.settings.primary,
            openai_model: self.settings.openai_model.clone(),
            gemini_model: self.settings.gemini_model.clone(),
            history: self.history.clone(),
            totals: self.totals,
            last_turn_usage: self.last_turn_usage,
            stream: self.settings.stream,
            max_tokens: self.settings.max_tokens,
            openai_persona: self.settings.openai_persona.clone(),
            gemini_persona: self.settings.gemini_persona.clone(),
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn totals(&self) -> TokenTotals {
        self.totals
    }

    pub fn last_turn_usage(&self) -> TokenUsage {
        self.last_turn_usage
    }

    pub fn settings(&self) -> &MultiChatSettings {
        &self.settings
    }

    pub fn set_stream(&mut self, stream: bool) {
        self.settings.stream = stream;
    }

    pub fn set_max_tokens(&mut self, max_tokens: Option<u32>) {
        self.settings.max_tokens = max_tokens;
    }

    pub fn model(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAi => &self.settings.openai_model,
            Provider::Gemini => &self.settings.gemini_model,
        }
    }

    pub fn set_model(&mut self, provider: Provider, model: impl Into<String>) {
        match provider {
            Provider::OpenAi => self.settings.openai_model = model.into(),
            Provider::Gemini => self.settings.gemini_model = model.into(),
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.last_turn_usage = TokenUsage::default();
    }

    pub fn transcript_path(&self) -> Option<&Path> {
        self.transcript.as_ref().map(TranscriptLog::path)
    }

    /// Move the transcript to `<stem>.jsonl` next to where it is now.
    pub fn rename_transcript(&mut self, stem: &str) -> io::Result<PathBuf> {
        match &mut self.transcript {
            Some(transcript) => transcript.rename(stem),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "this session has no transcript",
            )),
        }
    }

    /// Helper requests go to the primary provider's helper model.
    fn helper(&self) -> HelperClient<'_> {
        let primary = self.settings.primary;
        let model = match primary {
            Provider::OpenAi => &self.settings.helper_model_openai,
            Provider::Gemini => &self.settings.helper_model_gemini,
        };
        HelperClient::new(self.backend.as_ref(), self.engine(primary), model)
    }

    /// Memory text with this conversation folded into `existing_memory`.
    pub async fn consolidate_memory(&self, existing_memory: &str) -> Result<String, HelperError> {
        self.helper()
            .consolidate_memory(existing_memory, &self.history)
            .await
    }

    /// Memory text with `fact` merged into `existing_memory`.
    pub async fn inject_memory(
        &self,
        existing_memory: &str,
        fact: &str,
    ) -> Result<String, HelperError> {
        self.helper().inject_memory(existing_memory, fact).await
    }

    fn system_prompt_for(&self, provider: Provider) -> String {
        let persona = match provider {
            Provider::OpenAi => self.settings.openai_persona.as_deref(),
            Provider::Gemini => self.settings.gemini_persona.as_deref(),
        };
        let base = multichat_system_prompt(provider);
        match persona.map(str::trim).filter(|text| !text.is_empty()) {
            Some(persona) => format!("{base}\n\n{persona}"),
            None => base.to_string(),
        }
    }

    fn engine(&self, provider: Provider) -> &Engine {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Gemini => &self.gemini,
        }
    }

    fn request_for(
        &self,
        provider: Provider,
        user_text: &str,
        first_turn: bool,
        stream: bool,
    ) -> ChatRequest {
        let images: &[ImageAttachment] = if first_turn { &self.images } else { &[] };
        let mut history = translate_history(&self.history, provider);
        history.push(construct_user_message(provider, user_text, images));
        ChatRequest {
            engine: self.engine(provider).clone(),
            model: self.model(provider).to_string(),
            history,
            system_prompt: Some(self.system_prompt_for(provider)),
            max_tokens: self.settings.max_tokens,
            stream,
        }
    }

    async fn foreground_call(
        &self,
        provider: Provider,
        request: ChatRequest,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> ProviderReply {
        let streamed = request.stream;
        match self.backend.chat(request, sink, cancel).await {
            Ok(reply) => {
                let text = match reply.end {
                    StreamEnd::Failed(reason) if reply.text.is_empty() => error_text(reason),
                    StreamEnd::Cancelled if reply.text.is_empty() => {
                        error_text("response cancelled")
                    }
                    _ => clean_response_text(provider, &reply.text),
                };
                ProviderReply {
                    provider,
                    text,
                    usage: reply.usage,
                    streamed,
                }
            }
            Err(err) => {
                warn!(%provider, error = %err, "multichat call failed");
                ProviderReply {
                    provider,
                    text: error_text(&err),
                    usage: TokenUsage::default(),
                    streamed: false,
                }
            }
        }
    }

    /// Run `request` on a spawned task and report through a oneshot channel.
    fn spawn_worker(
        &self,
        provider: Provider,
        request: ChatRequest,
    ) -> (tokio::task::JoinHandle<()>, oneshot::Receiver<WorkerReply>) {
        let (tx, rx) = oneshot::channel();
        let backend = Arc::clone(&self.backend);
        let handle = tokio::spawn(async move {
            let reply = match backend
                .chat(request, &mut NullSink, &CancellationToken::new())
                .await
            {
                Ok(reply) if reply.text.is_empty() => match reply.end {
                    StreamEnd::Failed(reason) => WorkerReply {
                        provider,
                        text: error_text(reason),
                        usage: reply.usage,
                    },
                    _ => WorkerReply {
                        provider,
                        text: String::new(),
                        usage: reply.usage,
                    },
                },
                Ok(reply) => WorkerReply {
                    provider,
                    text: clean_response_text(provider, &reply.text),
                    usage: reply.usage,
                },
                Err(err) => {
                    warn!(%provider, error = %err, "background call failed");
                    WorkerReply {
                        provider,
                        text: error_text(&err),
                        usage: TokenUsage::default(),
                    }
                }
            };
            let _ = tx.send(reply);
        });
        (handle, rx)
    }

    /// Process one line of director input.
    ///
    /// Returns the usage message for a malformed `/ai` line, in which case
    /// nothing was sent and no state changed.
    pub async fn process_turn(
        &mut self,
        input: &str,
        first_turn: bool,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<MultiTurnOutcome, TurnAddressError> {
        let address = TurnAddress::parse(input)?;
        debug!(?address, "multichat turn");

        let (user_text, replies) = match address {
            TurnAddress::Broadcast(text) => {
                let user_text = format!("Director to All: {text}");
                let replies = self.broadcast(&user_text, first_turn, sink, cancel).await;
                (user_text, replies)
            }
            TurnAddress::Targeted { provider, prompt } => {
                let user_text = format!("Director to {}: {prompt}", provider.label());
                let stream = self.settings.stream;
                let request = self.request_for(provider, &user_text, first_turn, stream);
                let reply = self.foreground_call(provider, request, sink, cancel).await;
                (user_text, vec![reply])
            }
        };

        let primary_usage = replies
            .iter()
            .find(|reply| reply.provider == self.settings.primary)
            .or_else(|| replies.first())
            .map(|reply| reply.usage)
            .unwrap_or_default();

        let start = self.history.len();
        self.history
            .push(construct_user_message(Provider::OpenAi, &user_text, &[]));
        for reply in &replies {
            let turn = construct_assistant_message(Provider::OpenAi, &reply.text);
            self.history.push(turn.with_source(reply.provider));
            self.totals.add(&reply.usage);
        }
        self.last_turn_usage = primary_usage;

        if let Some(transcript) = &self.transcript {
            if let Err(err) = transcript.append_slice(&self.history[start..]) {
                warn!(
                    path = %transcript.path().display(),
                    error = %err,
                    "could not write transcript"
                );
            }
        }

        Ok(MultiTurnOutcome {
            replies,
            last_turn_usage: primary_usage,
        })
    }

    async fn broadcast(
        &self,
        user_text: &str,
        first_turn: bool,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Vec<ProviderReply> {
        let primary = self.settings.primary;
        let secondary = primary.other();

        let background = self.request_for(secondary, user_text, first_turn, false);
        let (handle, rx) = self.spawn_worker(secondary, background);

        let foreground = self.request_for(primary, user_text, first_turn, self.settings.stream);
        let primary_reply = self.foreground_call(primary, foreground, sink, cancel).await;

        if let Err(err) = handle.await {
            warn!(error = %err, "background task did not finish cleanly");
        }
        let secondary_reply = match rx.await {
            Ok(worker) => ProviderReply {
                provider: worker.provider,
                text: worker.text,
                usage: worker.usage,
                streamed: false,
            },
            Err(_) => ProviderReply {
                provider: secondary,
                text: error_text("background task ended without a reply"),
                usage: TokenUsage::default(),
                streamed: false,
            },
        };

        let mut replies = vec![primary_reply, secondary_reply];
        replies.sort_by_key(|reply| reply.provider);
        replies
    }
}
