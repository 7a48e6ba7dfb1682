//! Single-provider chat sessions.
//!
//! A [`ChatSession`] owns the conversation history and drives one provider
//! call per user turn. Successful turns are appended, counted and written to
//! the transcript; failed turns leave every piece of state untouched. Long
//! histories are periodically condensed into a summary turn produced by a
//! helper model. When the session ends it can fold the conversation into the
//! persistent memory and give its transcript a descriptive name.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::api_client::{ChatBackend, ChatReply, ChatRequest};
use crate::core::chat_stream::{StreamEnd, StreamSink};
use crate::core::config::Config;
use crate::core::engine::Engine;
use crate::core::error::{ApiRequestError, HelperError};
use crate::core::helper::{history_excerpt, HelperClient};
use crate::core::memory::MemoryStore;
use crate::core::message::{ImageAttachment, Turn};
use crate::core::persona::PersonaFile;
use crate::core::prompts::{history_summary_prompt, PREVIOUSLY_DISCUSSED_MARKER};
use crate::core::provider::Provider;
use crate::core::translate::{
    construct_assistant_message, construct_user_message, translate_history,
};
use crate::core::usage::{TokenTotals, TokenUsage};
use crate::utils::formatters::sanitize_filename;
use crate::utils::input::Attachment;
use crate::utils::logging::TranscriptLog;

const MEMORY_HEADER: &str = "--- PERSISTENT MEMORY ---";
const ATTACHMENTS_HEADER: &str = "--- ATTACHED FILES ---";

/// Behavior knobs handed to a session, resolved from [`Config`] and CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub stream: bool,
    pub max_tokens: Option<u32>,
    pub summary_max_tokens: u32,
    pub history_summary_threshold_turns: usize,
    pub history_summary_trim_turns: usize,
    pub helper_model_openai: String,
    pub helper_model_gemini: String,
    pub memory_enabled: bool,
    pub log_rename_max_tokens: u32,
}

impl ChatSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stream: config.stream(),
            max_tokens: Some(config.default_max_tokens()),
            summary_max_tokens: config.summary_max_tokens(),
            history_summary_threshold_turns: config.history_summary_threshold_turns(),
            history_summary_trim_turns: config.history_summary_trim_turns(),
            helper_model_openai: config.helper_model(Provider::OpenAi),
            helper_model_gemini: config.helper_model(Provider::Gemini),
            memory_enabled: config.memory_enabled(),
            log_rename_max_tokens: config.log_rename_max_tokens(),
        }
    }

    pub fn helper_model(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAi => &self.helper_model_openai,
            Provider::Gemini => &self.helper_model_gemini,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The persona in effect and what it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePersona {
    pub id: String,
    pub name: String,
    /// Attachments the persona added, by path, so clearing it removes
    /// exactly those.
    #[serde(default)]
    pub attachment_paths: Vec<String>,
    /// System prompt from before the first persona was applied.
    #[serde(default)]
    pub previous_system_prompt: Option<String>,
}

/// Everything about a session that survives a save/load cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub engine_name: Provider,
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default)]
    pub images_sent: bool,
    #[serde(default)]
    pub memory: Option<String>,
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
    pub persona: Option<ActivePersona>,
}

impl SessionState {
    pub fn new(provider: Provider, model: impl Into<String>, settings: &ChatSettings) -> Self {
        Self {
            engine_name: provider,
            model: model.into(),
            system_prompt: None,
            attachments: Vec::new(),
            images: Vec::new(),
            images_sent: false,
            memory: None,
            history: Vec::new(),
            totals: TokenTotals::default(),
            last_turn_usage: TokenUsage::default(),
            stream: settings.stream,
            max_tokens: settings.max_tokens,
            persona: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingResponse,
    Appended,
    Errored,
}

/// What a completed turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub text: String,
    pub usage: TokenUsage,
    pub end: StreamEnd,
    /// Whether the turn was added to history.
    pub appended: bool,
    /// Whether older history was folded into a summary afterwards.
    pub condensed: bool,
}

/// Join the base prompt, persistent memory and attached files into one
/// system prompt. Empty sections are left out; `None` when nothing remains.
pub fn assemble_system_prompt(
    base: Option<&str>,
    memory: Option<&str>,
    attachments: &[Attachment],
) -> Option<String> {
    let mut sections = Vec::new();

    if let Some(base) = base.map(str::trim).filter(|text| !text.is_empty()) {
        sections.push(base.to_string());
    }
    if let Some(memory) = memory.map(str::trim).filter(|text| !text.is_empty()) {
        sections.push(format!("{MEMORY_HEADER}\n{memory}"));
    }
    if !attachments.is_empty() {
        let files = attachments
            .iter()
            .map(|file| format!("--- FILE: {} ---\n{}", file.path, file.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        sections.push(format!("{ATTACHMENTS_HEADER}\n{files}"));
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

/// What happened when a session was wrapped up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapUp {
    pub memory_updated: bool,
    pub renamed_to: Option<PathBuf>,
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    engine: Engine,
    state: SessionState,
    settings: ChatSettings,
    transcript: Option<TranscriptLog>,
    phase: TurnPhase,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        engine: Engine,
        model: impl Into<String>,
        settings: ChatSettings,
    ) -> Self {
        let state = SessionState::new(engine.provider(), model, &settings);
        Self::from_state(backend, engine, state, settings)
    }

    /// Resume from a saved state. The engine must match `state.engine_name`.
    pub fn from_state(
        backend: Arc<dyn ChatBackend>,
        engine: Engine,
        state: SessionState,
        settings: ChatSettings,
    ) -> Self {
        Self {
            backend,
            engine,
            state,
            settings,
            transcript: None,
            phase: TurnPhase::Idle,
        }
    }

    pub fn with_transcript(mut self, transcript: TranscriptLog) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn provider(&self) -> Provider {
        self.engine.provider()
    }

    pub fn history(&self) -> &[Turn] {
        &self.state.history
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn transcript_path(&self) -> Option<&Path> {
        self.transcript.as_ref().map(TranscriptLog::path)
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        debug!(from = ?self.phase, to = ?phase, "turn phase");
        self.phase = phase;
    }

    pub fn system_prompt(&self) -> Option<String> {
        let memory = if self.settings.memory_enabled {
            self.state.memory.as_deref()
        } else {
            None
        };
        assemble_system_prompt(
            self.state.system_prompt.as_deref(),
            memory,
            &self.state.attachments,
        )
    }

    fn pending_images(&self) -> &[ImageAttachment] {
        if self.state.images_sent {
            &[]
        } else {
            &self.state.images
        }
    }

    fn chat_request(&self, history: Vec<Turn>) -> ChatRequest {
        ChatRequest {
            engine: self.engine.clone(),
            model: self.state.model.clone(),
            history,
            system_prompt: self.system_prompt(),
            max_tokens: self.state.max_tokens,
            stream: self.state.stream,
        }
    }

    /// Send one user turn and, on success, record it.
    ///
    /// Images attached to the session ride along until a turn carrying them
    /// succeeds. A stream cut short with no text is reported but not added
    /// to history.
    pub async fn take_turn(
        &mut self,
        user_text: &str,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ApiRequestError> {
        let provider = self.provider();
        let user_turn = construct_user_message(provider, user_text, self.pending_images());
        let mut history = self.state.history.clone();
        history.push(user_turn.clone());
        let request = self.chat_request(history);

        self.set_phase(TurnPhase::AwaitingResponse);
        let reply = match self.backend.chat(request, sink, cancel).await {
            Ok(reply) => reply,
            Err(err) => {
                self.set_phase(TurnPhase::Errored);
                self.set_phase(TurnPhase::Idle);
                return Err(err);
            }
        };

        let ChatReply { text, usage, end } = reply;
        if let StreamEnd::Failed(reason) = &end {
            warn!(%reason, "response ended early");
        }
        let appended = end == StreamEnd::Completed || !text.is_empty();
        let mut condensed = false;

        if appended {
            let assistant_turn = construct_assistant_message(provider, &text);
            self.state.history.push(user_turn.clone());
            self.state.history.push(assistant_turn.clone());
            self.state.images_sent = true;
            self.state.totals.add(&usage);
            self.state.last_turn_usage = usage;
            self.write_transcript(&user_turn, &assistant_turn);
            self.set_phase(TurnPhase::Appended);
            condensed = self.condense_if_needed().await;
        } else {
            info!("discarding empty interrupted response");
        }
        self.set_phase(TurnPhase::Idle);

        Ok(TurnOutcome {
            text,
            usage,
            end,
            appended,
            condensed,
        })
    }

    /// One self-contained exchange that does not touch history.
    pub async fn single_shot(
        &mut self,
        prompt: &str,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ApiRequestError> {
        let provider = self.provider();
        let user_turn = construct_user_message(provider, prompt, &self.state.images);
        let request = self.chat_request(vec![user_turn.clone()]);
        let ChatReply { text, usage, end } = self.backend.chat(request, sink, cancel).await?;

        self.state.totals.add(&usage);
        self.state.last_turn_usage = usage;
        let assistant_turn = construct_assistant_message(provider, &text);
        self.write_transcript(&user_turn, &assistant_turn);

        Ok(TurnOutcome {
            text,
            usage,
            end,
            appended: false,
            condensed: false,
        })
    }

    fn write_transcript(&self, user_turn: &Turn, assistant_turn: &Turn) {
        if let Some(transcript) = &self.transcript {
            let model = &self.state.model;
            if let Err(err) = transcript.append_turn(model, user_turn, assistant_turn) {
                warn!(
                    path = %transcript.path().display(),
                    error = %err,
                    "could not write transcript"
                );
            }
        }
    }

    async fn condense_if_needed(&mut self) -> bool {
        let threshold = self.settings.history_summary_threshold_turns;
        if threshold == 0 || self.state.history.len() < threshold * 2 {
            return false;
        }
        match self.condense().await {
            Ok(removed) => {
                info!(removed, "condensed conversation history");
                true
            }
            Err(err) => {
                warn!(error = %err, "history summary failed; keeping full history");
                false
            }
        }
    }

    /// Replace the oldest `trim_turns` pairs with a single summary turn.
    /// Returns how many records were folded in.
    pub async fn condense(&mut self) -> Result<usize, HelperError> {
        let count = (self.settings.history_summary_trim_turns * 2).min(self.state.history.len());
        if count == 0 {
            return Ok(0);
        }

        let excerpt = history_excerpt(&self.state.history[..count]);
        let (summary, _usage) = self
            .perform_helper_request(
                &history_summary_prompt(&excerpt),
                Some(self.settings.summary_max_tokens),
            )
            .await?;

        let summary_turn = construct_user_message(
            self.provider(),
            &format!("{PREVIOUSLY_DISCUSSED_MARKER}\n{}", summary.trim()),
            &[],
        );
        self.state
            .history
            .splice(..count, std::iter::once(summary_turn));
        Ok(count)
    }

    fn helper(&self) -> HelperClient<'_> {
        HelperClient::new(
            self.backend.as_ref(),
            &self.engine,
            self.settings.helper_model(self.provider()),
        )
    }

    /// A silent, non-streaming request to the helper model of the current
    /// provider. An empty reply is an error.
    pub async fn perform_helper_request(
        &self,
        prompt: &str,
        max_tokens: Option<u32>,
    ) -> Result<(String, TokenUsage), HelperError> {
        self.helper().request(prompt, max_tokens).await
    }

    /// Memory text with this conversation folded into `existing_memory`.
    pub async fn consolidate_memory(&self, existing_memory: &str) -> Result<String, HelperError> {
        self.helper()
            .consolidate_memory(existing_memory, &self.state.history)
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

    /// A descriptive file stem for this conversation's transcript.
    pub async fn suggest_log_name(&self) -> Result<String, HelperError> {
        self.helper()
            .suggest_log_name(&self.state.history, self.settings.log_rename_max_tokens)
            .await
    }

    /// Replace the memory used in the system prompt. Blank text clears it.
    pub fn set_memory(&mut self, memory: &str) {
        let memory = memory.trim();
        self.state.memory = (!memory.is_empty()).then(|| memory.to_string());
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

    /// End-of-session bookkeeping: fold the conversation into `memory`
    /// when memory is enabled, then rename the transcript to `custom_name`
    /// or to a name the helper model suggests. Each step that fails is
    /// logged and skipped.
    pub async fn finalize(
        &mut self,
        memory: Option<&MemoryStore>,
        custom_name: Option<&str>,
    ) -> WrapUp {
        let mut wrap_up = WrapUp::default();
        if self.state.history.is_empty() {
            return wrap_up;
        }

        if let Some(store) = memory.filter(|_| self.settings.memory_enabled) {
            wrap_up.memory_updated = self.update_memory_file(store).await;
        }

        let has_log = self.transcript_path().is_some_and(Path::exists);
        if has_log {
            let stem = match custom_name.map(str::trim).filter(|name| !name.is_empty()) {
                Some(name) => Some(sanitize_filename(name, 100)),
                None => match self.suggest_log_name().await {
                    Ok(stem) => Some(stem),
                    Err(err) => {
                        warn!(error = %err, "could not name the transcript");
                        None
                    }
                },
            };
            if let Some(stem) = stem {
                match self.rename_transcript(&stem) {
                    Ok(path) => wrap_up.renamed_to = Some(path),
                    Err(err) => warn!(%stem, error = %err, "could not rename the transcript"),
                }
            }
        }
        wrap_up
    }

    async fn update_memory_file(&mut self, store: &MemoryStore) -> bool {
        let existing = match store.read() {
            Ok(existing) => existing,
            Err(err) => {
                warn!(path = %store.path().display(), error = %err, "could not read memory");
                return false;
            }
        };
        let updated = match self.consolidate_memory(&existing).await {
            Ok(updated) => updated,
            Err(err) => {
                warn!(error = %err, "memory update failed; keeping the old memory");
                return false;
            }
        };
        if let Err(err) = store.write(&updated) {
            warn!(path = %store.path().display(), error = %err, "could not write memory");
            return false;
        }
        info!("persistent memory updated");
        self.set_memory(&updated);
        true
    }

    /// Take on a persona's prompt, settings and files. `attachments` are the
    /// persona's files, already read. Any previous persona is dropped first.
    /// Switching engines is left to the caller.
    pub fn apply_persona(&mut self, file: &PersonaFile, attachments: Vec<Attachment>) {
        let previous_system_prompt = match self.take_persona() {
            Some(old) => old.previous_system_prompt,
            None => self.state.system_prompt.clone(),
        };
        let persona = &file.persona;
        if let Some(model) = &persona.model {
            self.state.model = model.clone();
        }
        if let Some(limit) = persona.max_tokens {
            self.state.max_tokens = Some(limit);
        }
        if let Some(stream) = persona.stream {
            self.state.stream = stream;
        }

        let attachment_paths = attachments.iter().map(|file| file.path.clone()).collect();
        self.state
            .attachments
            .retain(|existing| attachments.iter().all(|new| new.path != existing.path));
        self.state.attachments.extend(attachments);
        self.state.system_prompt = Some(persona.system_prompt.clone());
        self.state.persona = Some(ActivePersona {
            id: file.id.clone(),
            name: persona.name.clone(),
            attachment_paths,
            previous_system_prompt,
        });
    }

    /// Drop the active persona, restoring the earlier system prompt.
    /// Returns the persona that was cleared.
    pub fn clear_persona(&mut self) -> Option<ActivePersona> {
        let old = self.take_persona()?;
        self.state.system_prompt = old.previous_system_prompt.clone();
        Some(old)
    }

    fn take_persona(&mut self) -> Option<ActivePersona> {
        let old = self.state.persona.take()?;
        self.state
            .attachments
            .retain(|file| !old.attachment_paths.contains(&file.path));
        Some(old)
    }

    /// Drop the last `pairs` exchanges. Returns how many records went.
    pub fn forget(&mut self, pairs: usize) -> usize {
        let count = (pairs * 2).min(self.state.history.len());
        let keep = self.state.history.len() - count;
        self.state.history.truncate(keep);
        count
    }

    /// Start the conversation over. Session totals are kept and attached
    /// images are sent again with the next turn.
    pub fn clear(&mut self) {
        self.state.history.clear();
        self.state.last_turn_usage = TokenUsage::default();
        self.state.images_sent = false;
    }

    /// Continue the conversation on another provider or model.
    pub fn switch_engine(&mut self, engine: Engine, model: impl Into<String>) {
        let target = engine.provider();
        if target != self.provider() {
            self.state.history = translate_history(&self.state.history, target);
        }
        self.state.engine_name = target;
        self.state.model = model.into();
        self.engine = engine;
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.state.model = model.into();
    }

    /// Record a generated image so later turns can refer to it.
    pub fn note_generated_image(&mut self, prompt: &str, saved_to: &Path) {
        let provider = self.provider();
        self.state.history.push(construct_user_message(
            provider,
            &format!("Generate an image: {prompt}"),
            &[],
        ));
        self.state.history.push(construct_assistant_message(
            provider,
            &format!("Image saved to {}", saved_to.display()),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::NullSink;
    use crate::core::persona::Persona;
    use crate::utils::test_utils::{ScriptedBackend, ScriptedReply};
    use tempfile::TempDir;

    fn usage(prompt: u64, completion: u64) -> TokenUsage {
        TokenUsage::new(prompt, completion, None, None)
    }

    fn session(
        backend: Arc<ScriptedBackend>,
        provider: Provider,
        settings: ChatSettings,
    ) -> ChatSession {
        let engine = Engine::new(provider, "test-key");
        ChatSession::new(backend, engine, "test-model", settings)
    }

    fn quiet_settings() -> ChatSettings {
        ChatSettings {
            stream: false,
            ..ChatSettings::default()
        }
    }

    #[test]
    fn system_prompt_sections_in_fixed_order() {
        let attachments = vec![
            Attachment {
                path: "a.txt".into(),
                content: "alpha".into(),
            },
            Attachment {
                path: "b.txt".into(),
                content: "beta".into(),
            },
        ];
        let prompt = assemble_system_prompt(Some("Be brief."), Some("likes tea"), &attachments)
            .expect("prompt");
        assert_eq!(
            prompt,
            "Be brief.\n\n--- PERSISTENT MEMORY ---\nlikes tea\n\n--- ATTACHED FILES ---\n\
             --- FILE: a.txt ---\nalpha\n\n--- FILE: b.txt ---\nbeta"
        );

        assert_eq!(assemble_system_prompt(None, Some("  "), &[]), None);
        assert_eq!(
            assemble_system_prompt(None, Some("fact"), &[]).as_deref(),
            Some("--- PERSISTENT MEMORY ---\nfact")
        );
    }

    #[tokio::test]
    async fn successful_turn_appends_and_counts() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(Provider::OpenAi, ScriptedReply::ok("Hi there", usage(10, 4)));
        let mut chat = session(backend.clone(), Provider::OpenAi, quiet_settings());

        let outcome = chat
            .take_turn("Hello", &mut NullSink, &CancellationToken::new())
            .await
            .expect("turn");

        assert_eq!(outcome.text, "Hi there");
        assert!(outcome.appended);
        assert_eq!(chat.history().len(), 2);
        assert_eq!(chat.history()[0].text(), "Hello");
        assert_eq!(chat.history()[1].text(), "Hi there");
        assert_eq!(chat.state().totals.total(), 14);
        assert_eq!(chat.state().last_turn_usage, usage(10, 4));
        assert_eq!(chat.phase(), TurnPhase::Idle);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].history.len(), 1);
        assert_eq!(calls[0].max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn failed_turn_leaves_state_untouched() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(Provider::Gemini, ScriptedReply::ok("first", usage(3, 3)));
        backend.push(Provider::Gemini, ScriptedReply::err("HTTP 500"));
        let mut chat = session(backend, Provider::Gemini, quiet_settings());
        let cancel = CancellationToken::new();

        chat.take_turn("one", &mut NullSink, &cancel).await.unwrap();
        let before = chat.state().clone();

        let err = chat.take_turn("two", &mut NullSink, &cancel).await.unwrap_err();
        assert_eq!(err.message, "HTTP 500");
        assert_eq!(chat.state(), &before);
        assert_eq!(chat.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn images_are_sent_only_until_a_turn_succeeds() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(Provider::OpenAi, ScriptedReply::err("boom"));
        backend.push(Provider::OpenAi, ScriptedReply::ok("a cat", usage(1, 1)));
        backend.push(Provider::OpenAi, ScriptedReply::ok("yes", usage(1, 1)));
        let mut chat = session(backend.clone(), Provider::OpenAi, quiet_settings());
        chat.state_mut().images.push(ImageAttachment {
            mime_type: "image/png".into(),
            data: "AAAA".into(),
        });
        let cancel = CancellationToken::new();

        assert!(chat.take_turn("what?", &mut NullSink, &cancel).await.is_err());
        chat.take_turn("what?", &mut NullSink, &cancel).await.unwrap();
        chat.take_turn("sure?", &mut NullSink, &cancel).await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].history[0].image_count(), 1);
        assert_eq!(calls[1].history[0].image_count(), 1);
        assert_eq!(calls[2].history.last().unwrap().image_count(), 0);
    }

    #[tokio::test]
    async fn history_is_condensed_at_threshold() {
        let backend = Arc::new(ScriptedBackend::new());
        let settings = ChatSettings {
            stream: false,
            history_summary_threshold_turns: 3,
            history_summary_trim_turns: 2,
            ..ChatSettings::default()
        };
        for index in 0..3 {
            backend.push(
                Provider::OpenAi,
                ScriptedReply::ok(&format!("reply {index}"), usage(1, 1)),
            );
        }
        backend.push(Provider::OpenAi, ScriptedReply::ok("  they said hello  ", usage(5, 5)));
        let mut chat = session(backend.clone(), Provider::OpenAi, settings);
        let cancel = CancellationToken::new();

        for index in 0..2 {
            let outcome = chat
                .take_turn(&format!("msg {index}"), &mut NullSink, &cancel)
                .await
                .unwrap();
            assert!(!outcome.condensed);
        }
        let outcome = chat.take_turn("msg 2", &mut NullSink, &cancel).await.unwrap();
        assert!(outcome.condensed);

        let history = chat.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].text(), "[PREVIOUSLY DISCUSSED]:\nthey said hello");
        assert_eq!(history[1].text(), "msg 2");
        assert_eq!(history[2].text(), "reply 2");

        let helper_call = backend.calls().pop().unwrap();
        assert_eq!(helper_call.model, "gpt-4o-mini");
        assert!(!helper_call.stream);
        assert_eq!(helper_call.max_tokens, Some(4096));
        assert!(helper_call.history[0].text().contains("user: msg 0\nassistant: reply 0"));
        // Summary usage is not billed to the conversation.
        assert_eq!(chat.state().totals.total(), 6);
    }

    #[tokio::test]
    async fn helper_failure_keeps_history() {
        let backend = Arc::new(ScriptedBackend::new());
        let settings = ChatSettings {
            stream: false,
            history_summary_threshold_turns: 1,
            history_summary_trim_turns: 1,
            ..ChatSettings::default()
        };
        backend.push(Provider::Gemini, ScriptedReply::ok("reply", usage(1, 1)));
        backend.push(Provider::Gemini, ScriptedReply::ok("   ", usage(1, 0)));
        let mut chat = session(backend, Provider::Gemini, settings);

        let outcome = chat
            .take_turn("hi", &mut NullSink, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.condensed);
        assert_eq!(chat.history().len(), 2);
    }

    #[tokio::test]
    async fn empty_helper_reply_is_an_error() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(Provider::OpenAi, ScriptedReply::ok("", usage(1, 0)));
        let chat = session(backend, Provider::OpenAi, quiet_settings());

        let err = chat.perform_helper_request("summarize", Some(100)).await.unwrap_err();
        assert!(matches!(err, HelperError::EmptyResponse));
    }

    #[tokio::test]
    async fn streamed_turns_reach_the_sink() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(Provider::OpenAi, ScriptedReply::ok("streamed", usage(1, 1)));
        let mut chat = session(backend, Provider::OpenAi, ChatSettings::default());
        let mut sink = String::new();

        chat.take_turn("go", &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sink, "streamed");
    }

    #[test]
    fn forget_and_clear() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut chat = session(backend, Provider::OpenAi, quiet_settings());
        for index in 0..3 {
            chat.state_mut()
                .history
                .push(construct_user_message(Provider::OpenAi, &format!("q{index}"), &[]));
            chat.state_mut()
                .history
                .push(construct_assistant_message(Provider::OpenAi, &format!("a{index}")));
        }

        assert_eq!(chat.forget(1), 2);
        assert_eq!(chat.history().last().unwrap().text(), "a1");
        assert_eq!(chat.forget(10), 4);
        assert!(chat.history().is_empty());
        assert_eq!(chat.forget(1), 0);

        chat.state_mut().images_sent = true;
        chat.clear();
        assert!(!chat.state().images_sent);
    }

    #[test]
    fn switching_engine_translates_history() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut chat = session(backend, Provider::OpenAi, quiet_settings());
        chat.state_mut()
            .history
            .push(construct_user_message(Provider::OpenAi, "hello", &[]));
        chat.state_mut()
            .history
            .push(construct_assistant_message(Provider::OpenAi, "hi"));

        chat.switch_engine(Engine::new(Provider::Gemini, "g-key"), "gemini-pro");

        assert_eq!(chat.provider(), Provider::Gemini);
        assert_eq!(chat.state().engine_name, Provider::Gemini);
        assert_eq!(chat.state().model, "gemini-pro");
        let wire = serde_json::to_value(chat.history()).unwrap();
        assert_eq!(wire[0]["parts"][0]["text"], "hello");
        assert_eq!(wire[1]["role"], "model");
        assert_eq!(wire[1]["parts"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn single_shot_writes_transcript_without_history() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("say.jsonl");
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(Provider::Gemini, ScriptedReply::ok("42", usage(7, 1)));
        let mut chat = session(backend, Provider::Gemini, quiet_settings())
            .with_transcript(TranscriptLog::new(log_path.clone()));

        let outcome = chat
            .single_shot("answer?", &mut NullSink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, "42");
        assert!(chat.history().is_empty());
        assert_eq!(chat.state().totals.total(), 8);

        let entries = TranscriptLog::read_entries(&log_path).unwrap();
        assert_eq!(entries.len(), 1);
    }

    fn with_exchange(mut chat: ChatSession) -> ChatSession {
        let provider = chat.provider();
        chat.state_mut()
            .history
            .push(construct_user_message(provider, "I moved to Oslo", &[]));
        chat.state_mut()
            .history
            .push(construct_assistant_message(provider, "Welcome"));
        chat
    }

    fn logged_session(dir: &Path, backend: Arc<ScriptedBackend>) -> ChatSession {
        let log = TranscriptLog::new(dir.join("chatlogs").join("chat_20260101_openai.jsonl"));
        let prompt = construct_user_message(Provider::OpenAi, "I moved to Oslo", &[]);
        let reply = construct_assistant_message(Provider::OpenAi, "Welcome");
        log.append_turn("test-model", &prompt, &reply).unwrap();
        with_exchange(session(backend, Provider::OpenAi, quiet_settings()).with_transcript(log))
    }

    #[tokio::test]
    async fn finalize_updates_memory_and_names_the_transcript() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().join("persistent_memory.txt"));
        store.write("Likes tea.").unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(
            Provider::OpenAi,
            ScriptedReply::ok("Lives in Oslo. Likes tea.", usage(9, 6)),
        );
        backend.push(Provider::OpenAi, ScriptedReply::ok("oslo_move", usage(9, 2)));
        let mut chat = logged_session(dir.path(), backend.clone());

        let wrap_up = chat.finalize(Some(&store), None).await;

        let expected = dir.path().join("chatlogs").join("oslo_move.jsonl");
        assert!(wrap_up.memory_updated);
        assert_eq!(wrap_up.renamed_to.as_deref(), Some(expected.as_path()));
        assert_eq!(store.read().unwrap(), "Lives in Oslo. Likes tea.");
        assert_eq!(chat.state().memory.as_deref(), Some("Lives in Oslo. Likes tea."));
        assert_eq!(chat.transcript_path(), Some(expected.as_path()));
        assert!(expected.exists());

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "gpt-4o-mini");
        assert_eq!(calls[0].max_tokens, None);
        assert_eq!(calls[1].max_tokens, Some(2048));
        // Helper calls are not billed to the conversation.
        assert_eq!(chat.state().totals.total(), 0);
    }

    #[tokio::test]
    async fn finalize_with_a_custom_name_skips_the_helper() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let mut chat = logged_session(dir.path(), backend.clone());

        let wrap_up = chat.finalize(None, Some("Trip plans!")).await;

        assert!(!wrap_up.memory_updated);
        assert_eq!(
            wrap_up.renamed_to,
            Some(dir.path().join("chatlogs").join("Trip_plans.jsonl"))
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn finalize_failures_keep_memory_and_log_name() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().join("persistent_memory.txt"));
        store.write("Likes tea.").unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(Provider::OpenAi, ScriptedReply::err("quota exceeded"));
        backend.push(Provider::OpenAi, ScriptedReply::ok("", usage(1, 0)));
        let mut chat = logged_session(dir.path(), backend);
        let original = chat.transcript_path().map(Path::to_path_buf);

        let wrap_up = chat.finalize(Some(&store), None).await;

        assert_eq!(wrap_up, WrapUp::default());
        assert_eq!(store.read().unwrap(), "Likes tea.");
        assert_eq!(chat.transcript_path().map(Path::to_path_buf), original);
    }

    #[tokio::test]
    async fn finalize_does_nothing_for_an_empty_or_memoryless_session() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().join("persistent_memory.txt"));
        let backend = Arc::new(ScriptedBackend::new());

        let mut empty = session(backend.clone(), Provider::Gemini, quiet_settings());
        assert_eq!(empty.finalize(Some(&store), None).await, WrapUp::default());

        let settings = ChatSettings {
            memory_enabled: false,
            ..quiet_settings()
        };
        let mut unlogged = with_exchange(session(backend.clone(), Provider::Gemini, settings));
        assert_eq!(unlogged.finalize(Some(&store), None).await, WrapUp::default());
        assert!(backend.calls().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn injected_facts_use_the_helper_model() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(
            Provider::Gemini,
            ScriptedReply::ok("Likes tea. Is vegetarian.", usage(4, 4)),
        );
        let mut chat = session(backend.clone(), Provider::Gemini, quiet_settings());

        let updated = chat.inject_memory("Likes tea.", "is vegetarian").await.unwrap();
        chat.set_memory(&updated);

        assert_eq!(chat.state().memory.as_deref(), Some("Likes tea. Is vegetarian."));
        assert_eq!(backend.calls()[0].model, "gemini-1.5-flash-latest");
        assert!(chat.history().is_empty());

        chat.set_memory("   ");
        assert_eq!(chat.state().memory, None);
    }

    fn persona_file(id: &str, model: Option<&str>) -> PersonaFile {
        PersonaFile {
            id: id.to_string(),
            persona: Persona {
                name: format!("{id} persona"),
                description: String::new(),
                system_prompt: format!("You are {id}."),
                engine: None,
                model: model.map(str::to_string),
                max_tokens: Some(256),
                stream: Some(true),
                attachments: Vec::new(),
            },
        }
    }

    fn attachment(path: &str) -> Attachment {
        Attachment {
            path: path.to_string(),
            content: format!("contents of {path}"),
        }
    }

    #[test]
    fn personas_swap_prompts_and_files_and_clear_cleanly() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut chat = session(backend, Provider::OpenAi, quiet_settings());
        chat.state_mut().system_prompt = Some("Be brief.".into());
        chat.state_mut().attachments.push(attachment("mine.txt"));

        chat.apply_persona(
            &persona_file("pirate", Some("gpt-4o")),
            vec![attachment("ship.md")],
        );
        let state = chat.state();
        assert_eq!(state.system_prompt.as_deref(), Some("You are pirate."));
        assert_eq!(state.model, "gpt-4o");
        assert_eq!(state.max_tokens, Some(256));
        assert!(state.stream);
        assert_eq!(state.attachments.len(), 2);
        assert_eq!(state.persona.as_ref().unwrap().name, "pirate persona");

        chat.apply_persona(&persona_file("poet", None), vec![attachment("verse.md")]);
        let paths: Vec<_> = chat.state().attachments.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["mine.txt", "verse.md"]);
        assert_eq!(chat.state().model, "gpt-4o");

        let cleared = chat.clear_persona().unwrap();
        assert_eq!(cleared.id, "poet");
        assert_eq!(chat.state().system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(chat.state().attachments, vec![attachment("mine.txt")]);
        assert_eq!(chat.state().persona, None);
        assert_eq!(chat.clear_persona(), None);
    }
}
