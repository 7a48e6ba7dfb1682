//! Provider adapters.
//!
//! Each adapter knows one backend's endpoint layout, authentication and
//! request/response shapes. Adapters hold only the credential and base URL,
//! so they are cheap to clone into background tasks.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::api::models::{
    fetch_gemini_models, fetch_openai_models, filter_gemini_models, filter_openai_models,
    ModelTask,
};
use crate::api::{GeminiUsageMetadata, OpenAiUsage};
use crate::core::credentials::resolve_api_key;
use crate::core::error::MissingCredentialError;
use crate::core::message::{Role, Turn};
use crate::utils::redaction::redact_str;
use crate::core::provider::Provider;
use crate::core::usage::TokenUsage;
use crate::utils::url::{construct_api_url, normalize_base_url};

#[async_trait]
pub trait ChatAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    fn chat_url(&self, model: &str, stream: bool) -> String;

    fn headers(&self) -> Vec<(String, String)>;

    fn build_chat_payload(
        &self,
        history: &[Turn],
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        stream: bool,
        model: &str,
    ) -> Value;

    /// Assistant text of a non-streaming response, or `""` if absent.
    fn parse_chat_response(&self, body: &Value) -> String;

    fn parse_usage(&self, body: &Value) -> TokenUsage;

    /// Models usable for `task`. Failures are logged and yield an empty list.
    async fn fetch_available_models(
        &self,
        client: &reqwest::Client,
        task: ModelTask,
        timeout: Duration,
    ) -> Vec<String>;
}

fn wire_history(history: &[Turn]) -> Vec<Value> {
    history
        .iter()
        .filter(|turn| turn.role() != Role::Unknown)
        .filter_map(|turn| serde_json::to_value(turn.to_wire()).ok())
        .collect()
}

fn non_empty(prompt: Option<&str>) -> Option<&str> {
    prompt.filter(|text| !text.is_empty())
}

#[derive(Debug, Clone)]
pub struct OpenAiEngine {
    api_key: String,
    base_url: String,
}

impl OpenAiEngine {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Provider::OpenAi.default_base_url().to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Older models only accept `max_tokens`; everything else, including
    /// models that do not exist yet, gets `max_completion_tokens`.
    pub fn uses_legacy_token_field(model: &str) -> bool {
        model.starts_with("gpt-3.5-turbo")
            || (model.starts_with("gpt-4") && !model.starts_with("gpt-4o"))
    }
}

#[async_trait]
impl ChatAdapter for OpenAiEngine {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn chat_url(&self, _model: &str, _stream: bool) -> String {
        construct_api_url(&self.base_url, "chat/completions")
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }

    fn build_chat_payload(
        &self,
        history: &[Turn],
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        stream: bool,
        model: &str,
    ) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = non_empty(system_prompt) {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(wire_history(history));

        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(model));
        payload.insert("messages".to_string(), Value::Array(messages));
        payload.insert("stream".to_string(), json!(stream));
        if stream {
            payload.insert("stream_options".to_string(), json!({"include_usage": true}));
        }
        if let Some(limit) = max_tokens.filter(|limit| *limit > 0) {
            let field = if Self::uses_legacy_token_field(model) {
                "max_tokens"
            } else {
                "max_completion_tokens"
            };
            payload.insert(field.to_string(), json!(limit));
        }
        Value::Object(payload)
    }

    fn parse_chat_response(&self, body: &Value) -> String {
        let Some(message) = body.pointer("/choices/0/message") else {
            warn!("OpenAI response carried no choices[0].message");
            return String::new();
        };
        match serde_json::from_value::<Turn>(message.clone()) {
            Ok(turn) => turn.text().to_string(),
            Err(_) => message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn parse_usage(&self, body: &Value) -> TokenUsage {
        body.get("usage")
            .and_then(|usage| serde_json::from_value::<OpenAiUsage>(usage.clone()).ok())
            .map(TokenUsage::from)
            .unwrap_or_default()
    }

    async fn fetch_available_models(
        &self,
        client: &reqwest::Client,
        task: ModelTask,
        timeout: Duration,
    ) -> Vec<String> {
        match fetch_openai_models(client, &self.base_url, &self.api_key, timeout).await {
            Ok(response) => filter_openai_models(&response.data, task),
            Err(err) => {
                warn!(error = %err, "could not fetch OpenAI model list");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiEngine {
    api_key: String,
    base_url: String,
}

impl GeminiEngine {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Provider::Gemini.default_base_url().to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

#[async_trait]
impl ChatAdapter for GeminiEngine {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn chat_url(&self, model: &str, stream: bool) -> String {
        let base = normalize_base_url(&self.base_url);
        if stream {
            format!(
                "{base}/models/{model}:streamGenerateContent?key={}&alt=sse",
                self.api_key
            )
        } else {
            format!("{base}/models/{model}:generateContent?key={}", self.api_key)
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![("Content-Type".to_string(), "application/json".to_string())]
    }

    fn build_chat_payload(
        &self,
        history: &[Turn],
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        _stream: bool,
        _model: &str,
    ) -> Value {
        let mut payload = Map::new();
        payload.insert("contents".to_string(), Value::Array(wire_history(history)));
        if let Some(system) = non_empty(system_prompt) {
            payload.insert(
                "system_instruction".to_string(),
                json!({"parts": [{"text": system}]}),
            );
        }
        if let Some(limit) = max_tokens.filter(|limit| *limit > 0) {
            payload.insert(
                "generationConfig".to_string(),
                json!({"maxOutputTokens": limit}),
            );
        }
        Value::Object(payload)
    }

    fn parse_chat_response(&self, body: &Value) -> String {
        if let Some(text) = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
        {
            return text.to_string();
        }

        match body
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
        {
            Some(reason) if reason != "UNKNOWN" => {
                info!(%reason, "Gemini response finished without text content");
            }
            _ => {
                warn!(response = %body, "could not extract Gemini response text or finish reason");
            }
        }
        String::new()
    }

    fn parse_usage(&self, body: &Value) -> TokenUsage {
        body.get("usageMetadata")
            .and_then(|usage| serde_json::from_value::<GeminiUsageMetadata>(usage.clone()).ok())
            .map(TokenUsage::from)
            .unwrap_or_default()
    }

    async fn fetch_available_models(
        &self,
        client: &reqwest::Client,
        _task: ModelTask,
        timeout: Duration,
    ) -> Vec<String> {
        match fetch_gemini_models(client, &self.base_url, &self.api_key, timeout).await {
            Ok(response) => filter_gemini_models(&response.models),
            Err(err) => {
                let error = redact_str(&err.to_string());
                warn!(%error, "could not fetch Gemini model list");
                Vec::new()
            }
        }
    }
}

/// A configured backend. New providers are added as variants here.
#[derive(Debug, Clone)]
pub enum Engine {
    OpenAi(OpenAiEngine),
    Gemini(GeminiEngine),
}

impl Engine {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        match provider {
            Provider::OpenAi => Engine::OpenAi(OpenAiEngine::new(api_key)),
            Provider::Gemini => Engine::Gemini(GeminiEngine::new(api_key)),
        }
    }

    /// Build an engine from the provider's environment credential.
    ///
    /// `OPENAI_BASE_URL` / `GEMINI_BASE_URL` override the endpoint when set.
    pub fn from_env(provider: Provider) -> Result<Self, MissingCredentialError> {
        let api_key = resolve_api_key(provider)?;
        let engine = Engine::new(provider, api_key);
        let override_var = match provider {
            Provider::OpenAi => "OPENAI_BASE_URL",
            Provider::Gemini => "GEMINI_BASE_URL",
        };
        Ok(match std::env::var(override_var) {
            Ok(url) if !url.trim().is_empty() => engine.with_base_url(url.trim()),
            _ => engine,
        })
    }

    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        match self {
            Engine::OpenAi(engine) => Engine::OpenAi(OpenAiEngine { base_url, ..engine }),
            Engine::Gemini(engine) => Engine::Gemini(GeminiEngine { base_url, ..engine }),
        }
    }

    pub fn provider(&self) -> Provider {
        self.adapter().provider()
    }

    pub fn api_key(&self) -> &str {
        match self {
            Engine::OpenAi(engine) => engine.api_key(),
            Engine::Gemini(engine) => engine.api_key(),
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            Engine::OpenAi(engine) => engine.base_url(),
            Engine::Gemini(engine) => engine.base_url(),
        }
    }

    pub fn adapter(&self) -> &dyn ChatAdapter {
        match self {
            Engine::OpenAi(engine) => engine,
            Engine::Gemini(engine) => engine,
        }
    }
}
