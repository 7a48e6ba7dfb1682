//! Helper requests: silent, non-streaming calls the client makes for its own
//! bookkeeping, such as summarizing history, updating the persistent memory
//! and naming transcripts.

use tokio_util::sync::CancellationToken;

use crate::core::api_client::{ChatBackend, ChatRequest};
use crate::core::chat_stream::NullSink;
use crate::core::engine::Engine;
use crate::core::error::HelperError;
use crate::core::message::Turn;
use crate::core::prompts::{
    direct_memory_injection_prompt, log_renaming_prompt, memory_integration_prompt,
};
use crate::core::translate::construct_user_message;
use crate::core::usage::TokenUsage;
use crate::utils::formatters::sanitize_filename;

const LOG_NAME_MAX_LEN: usize = 100;

/// `role: text` lines handed to helper prompts.
pub fn history_excerpt(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role().as_str(), turn.text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turn a model's suggested title into a file stem, or `None` when nothing
/// usable is left.
pub fn clean_log_name(reply: &str) -> Option<String> {
    let line = reply.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = line.trim_matches(|c: char| matches!(c, '\'' | '"' | '`') || c.is_whitespace());
    let line = line
        .strip_suffix(".jsonl")
        .or_else(|| line.strip_suffix(".JSONL"))
        .unwrap_or(line);
    if !line.chars().any(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(sanitize_filename(line, LOG_NAME_MAX_LEN))
}

/// A provider and model to send helper requests to.
pub struct HelperClient<'a> {
    backend: &'a dyn ChatBackend,
    engine: &'a Engine,
    model: &'a str,
}

impl<'a> HelperClient<'a> {
    pub fn new(backend: &'a dyn ChatBackend, engine: &'a Engine, model: &'a str) -> Self {
        Self {
            backend,
            engine,
            model,
        }
    }

    /// One prompt, one reply. An empty reply is an error.
    pub async fn request(
        &self,
        prompt: &str,
        max_tokens: Option<u32>,
    ) -> Result<(String, TokenUsage), HelperError> {
        let request = ChatRequest {
            engine: self.engine.clone(),
            model: self.model.to_string(),
            history: vec![construct_user_message(self.engine.provider(), prompt, &[])],
            system_prompt: None,
            max_tokens,
            stream: false,
        };
        let reply = self
            .backend
            .chat(request, &mut NullSink, &CancellationToken::new())
            .await?;
        if reply.text.trim().is_empty() {
            return Err(HelperError::EmptyResponse);
        }
        Ok((reply.text, reply.usage))
    }

    /// Fold a conversation into the existing memory text.
    pub async fn consolidate_memory(
        &self,
        existing_memory: &str,
        history: &[Turn],
    ) -> Result<String, HelperError> {
        let prompt = memory_integration_prompt(existing_memory, &history_excerpt(history));
        let (memory, _usage) = self.request(&prompt, None).await?;
        Ok(memory.trim().to_string())
    }

    /// Merge one fact into the existing memory text.
    pub async fn inject_memory(
        &self,
        existing_memory: &str,
        fact: &str,
    ) -> Result<String, HelperError> {
        let prompt = direct_memory_injection_prompt(existing_memory, fact);
        let (memory, _usage) = self.request(&prompt, None).await?;
        Ok(memory.trim().to_string())
    }

    /// A short snake_case file stem describing `history`.
    pub async fn suggest_log_name(
        &self,
        history: &[Turn],
        max_tokens: u32,
    ) -> Result<String, HelperError> {
        let prompt = log_renaming_prompt(&history_excerpt(history));
        let (reply, _usage) = self.request(&prompt, Some(max_tokens)).await?;
        clean_log_name(&reply).ok_or(HelperError::UnusableName(reply))
    }
}
