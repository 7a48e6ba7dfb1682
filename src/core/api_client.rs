//! HTTP request engine.
//!
//! [`ApiClient::send`] performs one POST and classifies every failure into
//! an [`ApiRequestError`]. Every call, successful or not, produces exactly
//! one redacted raw log record through the shared [`RawLogRecorder`].

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::chat_stream::{extract_error_summary, process_stream, StreamEnd, StreamSink};
use crate::core::engine::Engine;
use crate::core::error::{ApiErrorKind, ApiRequestError};
use crate::core::message::Turn;
use crate::core::usage::TokenUsage;
use crate::utils::logging::{write_jsonl, RotatingFile};
use crate::utils::redaction::redact_value;

/// Raw log file size before it is rotated.
pub const RAW_LOG_MAX_BYTES: u64 = 2 * 1024 * 1024;
pub const RAW_LOG_BACKUPS: usize = 5;

/// A fully prepared API call.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub payload: Value,
    pub stream: bool,
    pub timeout: Duration,
}

pub enum ApiResponse {
    Parsed(Value),
    /// Open response handle for a streaming call; the body is unread.
    Stream(reqwest::Response),
}

#[derive(Debug, Default)]
struct RawLogState {
    debug: bool,
    entries: Vec<Value>,
    file: Option<RotatingFile>,
}

/// Collects redacted raw request/response records.
///
/// Records are always emitted as `debug` events on the `aiterm::raw` target.
/// While debug mode is on they are also kept in memory and appended to the
/// rotating raw log file. Clones share the same state so background calls
/// land in the same session log.
#[derive(Debug, Clone, Default)]
pub struct RawLogRecorder {
    inner: Arc<Mutex<RawLogState>>,
}

impl RawLogRecorder {
    pub fn new(file: Option<RotatingFile>, debug: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RawLogState {
                debug,
                entries: Vec::new(),
                file,
            })),
        }
    }

    pub fn set_debug(&self, enabled: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.debug = enabled;
        }
    }

    pub fn is_debug(&self) -> bool {
        self.inner.lock().map(|state| state.debug).unwrap_or(false)
    }

    pub fn record(&self, entry: &Value) {
        let safe = redact_value(entry);
        let line = safe.to_string();
        debug!(target: "aiterm::raw", "{line}");

        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        if !state.debug {
            return;
        }
        if let Some(file) = &state.file {
            if let Err(err) = file.append(&line) {
                warn!(path = %file.path().display(), error = %err, "could not write raw API log");
            }
        }
        state.entries.push(safe);
    }

    pub fn entries(&self) -> Vec<Value> {
        self.inner
            .lock()
            .map(|state| state.entries.clone())
            .unwrap_or_default()
    }

    /// Write the collected records to `path` if there are any.
    pub fn save_session_log(&self, path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
        let entries = self.entries();
        if entries.is_empty() {
            return Ok(false);
        }
        write_jsonl(path, &entries)?;
        Ok(true)
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    timeout: Duration,
    recorder: RawLogRecorder,
}

impl ApiClient {
    pub fn new(timeout: Duration, recorder: RawLogRecorder) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
            recorder,
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn recorder(&self) -> &RawLogRecorder {
        &self.recorder
    }

    pub async fn send(&self, request: &PendingRequest) -> Result<ApiResponse, ApiRequestError> {
        let headers: Map<String, Value> = request
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();
        let mut entry = json!({
            "timestamp": Local::now().to_rfc3339(),
            "request": {
                "url": request.url,
                "headers": headers,
                "payload": request.payload,
            },
        });

        let result = self.execute(request).await;

        entry["response"] = match &result {
            Ok(ApiResponse::Parsed(body)) => body.clone(),
            Ok(ApiResponse::Stream(response)) => json!({
                "status_code": response.status().as_u16(),
                "streaming": true,
            }),
            Err(err) => json!({"error": err.message}),
        };
        self.recorder.record(&entry);

        result
    }

    async fn execute(&self, request: &PendingRequest) -> Result<ApiResponse, ApiRequestError> {
        let mut builder = self.http.post(&request.url).json(&request.payload);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        // Streams are bounded per frame by the decoder instead.
        if !request.stream {
            builder = builder.timeout(request.timeout);
        }

        let send = builder.send();
        let response = if request.stream {
            match tokio::time::timeout(request.timeout, send).await {
                Ok(result) => result,
                Err(_) => {
                    let err = ApiRequestError::new(
                        ApiErrorKind::Timeout,
                        format!("no response within {} seconds", request.timeout.as_secs()),
                    );
                    error!(error = %err, "request error");
                    return Err(err);
                }
            }
        } else {
            send.await
        };

        let response = response.map_err(|err| {
            let err = ApiRequestError::from_transport(&err);
            error!(error = %err, "request error");
            err
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|value| extract_error_summary(&value))
                .filter(|summary| !summary.is_empty())
                .or_else(|| Some(text.trim().to_string()).filter(|text| !text.is_empty()))
                .unwrap_or_else(|| crate::core::error::DECODE_FAILURE_MESSAGE.to_string());
            error!(status = status.as_u16(), %message, "HTTP request error");
            return Err(ApiRequestError::new(
                ApiErrorKind::Status(status.as_u16()),
                message,
            ));
        }

        if request.stream {
            return Ok(ApiResponse::Stream(response));
        }

        let text = response
            .text()
            .await
            .map_err(|err| ApiRequestError::from_transport(&err))?;
        let body: Value = serde_json::from_str(&text).map_err(|_| {
            error!("failed to decode API response");
            ApiRequestError::decode()
        })?;

        if let Some(embedded) = body.get("error") {
            let message = embedded
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| embedded.as_str())
                .unwrap_or("Unknown API error")
                .to_string();
            error!(%message, "API error");
            return Err(ApiRequestError::new(ApiErrorKind::Embedded, message));
        }

        Ok(ApiResponse::Parsed(body))
    }
}

/// Everything needed for one chat call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub engine: Engine,
    pub model: String,
    pub history: Vec<Turn>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub usage: TokenUsage,
    pub end: StreamEnd,
}

/// The seam between turn coordinators and the network.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Perform one chat call. Streaming output is mirrored to `sink` and
    /// stops early when `cancel` fires.
    async fn chat(
        &self,
        request: ChatRequest,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ApiRequestError>;
}

impl ApiClient {
    pub async fn perform_chat_request(
        &self,
        request: ChatRequest,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ApiRequestError> {
        let adapter = request.engine.adapter();
        let pending = PendingRequest {
            url: adapter.chat_url(&request.model, request.stream),
            headers: adapter.headers(),
            payload: adapter.build_chat_payload(
                &request.history,
                request.system_prompt.as_deref(),
                request.max_tokens,
                request.stream,
                &request.model,
            ),
            stream: request.stream,
            timeout: self.timeout,
        };

        match self.send(&pending).await? {
            ApiResponse::Parsed(body) => Ok(ChatReply {
                text: adapter.parse_chat_response(&body),
                usage: adapter.parse_usage(&body),
                end: StreamEnd::Completed,
            }),
            ApiResponse::Stream(response) => {
                let outcome = process_stream(
                    adapter.provider(),
                    response.bytes_stream(),
                    sink,
                    cancel,
                    Some(self.timeout),
                )
                .await;
                Ok(ChatReply {
                    text: outcome.text,
                    usage: outcome.usage,
                    end: outcome.end,
                })
            }
        }
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn chat(
        &self,
        request: ChatRequest,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ApiRequestError> {
        self.perform_chat_request(request, sink, cancel).await
    }
}
