use std::fmt::Display;
use std::io::Write;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use memchr::memchr;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{GeminiUsageMetadata, OpenAiUsage};
use crate::core::provider::Provider;
use crate::core::usage::TokenUsage;

/// Receives text deltas as they are decoded.
pub trait StreamSink: Send {
    fn on_delta(&mut self, text: &str);
}

/// Discards deltas; used for background and helper calls.
pub struct NullSink;

impl StreamSink for NullSink {
    fn on_delta(&mut self, _text: &str) {}
}

/// Mirrors deltas to stdout as they arrive.
pub struct StdoutSink;

impl StreamSink for StdoutSink {
    fn on_delta(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

impl StreamSink for String {
    fn on_delta(&mut self, text: &str) {
        self.push_str(text);
    }
}

/// How a streamed response stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Sentinel frame or clean end of the connection.
    Completed,
    /// The user interrupted the stream.
    Cancelled,
    /// Transport error, idle timeout or an error frame from the provider.
    Failed(String),
}

/// Result of decoding one SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Blank lines, comments, non-data fields and malformed payloads.
    Ignored,
    Data {
        delta: Option<String>,
        usage: Option<TokenUsage>,
    },
    Done,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub text: String,
    pub usage: TokenUsage,
    pub end: StreamEnd,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

pub(crate) fn extract_error_summary(value: &Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                Value::String(s) => Some(s.to_string()),
                Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

fn openai_frame(data: &Value) -> StreamFrame {
    let delta = data
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_owned);
    let usage = data
        .get("usage")
        .filter(|usage| usage.is_object())
        .and_then(|usage| serde_json::from_value::<OpenAiUsage>(usage.clone()).ok())
        .map(TokenUsage::from);
    StreamFrame::Data { delta, usage }
}

fn gemini_frame(data: &Value) -> StreamFrame {
    let delta = data
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_owned);
    let usage = data
        .get("usageMetadata")
        .and_then(|usage| serde_json::from_value::<GeminiUsageMetadata>(usage.clone()).ok())
        .map(TokenUsage::from);
    StreamFrame::Data { delta, usage }
}

/// Decode one line of a provider's event stream.
///
/// OpenAI ends its stream with a `[DONE]` sentinel; Gemini simply closes the
/// connection. Frames whose payload is not JSON are ignored.
pub fn decode_line(provider: Provider, line: &str) -> StreamFrame {
    let Some(payload) = extract_data_payload(line.trim()) else {
        return StreamFrame::Ignored;
    };

    if provider == Provider::OpenAi && payload == "[DONE]" {
        return StreamFrame::Done;
    }

    let data: Value = match serde_json::from_str(payload) {
        Ok(data) => data,
        Err(err) => {
            if !payload.is_empty() {
                debug!(%provider, error = %err, "skipping malformed stream frame");
            }
            return StreamFrame::Ignored;
        }
    };

    if data.get("error").is_some() {
        let message = extract_error_summary(&data)
            .filter(|summary| !summary.is_empty())
            .unwrap_or_else(|| payload.to_string());
        return StreamFrame::Error(message);
    }

    match provider {
        Provider::OpenAi => openai_frame(&data),
        Provider::Gemini => gemini_frame(&data),
    }
}

struct StreamAccumulator<'a> {
    text: String,
    usage: TokenUsage,
    sink: &'a mut dyn StreamSink,
}

impl StreamAccumulator<'_> {
    /// Apply one decoded frame, returning the end state if it terminates the stream.
    fn apply(&mut self, frame: StreamFrame) -> Option<StreamEnd> {
        match frame {
            StreamFrame::Ignored => None,
            StreamFrame::Data { delta, usage } => {
                if let Some(delta) = delta {
                    self.sink.on_delta(&delta);
                    self.text.push_str(&delta);
                }
                if let Some(usage) = usage {
                    self.usage = usage;
                }
                None
            }
            StreamFrame::Done => Some(StreamEnd::Completed),
            StreamFrame::Error(message) => Some(StreamEnd::Failed(message)),
        }
    }

    fn finish(self, end: StreamEnd) -> StreamOutcome {
        StreamOutcome {
            text: self.text,
            usage: self.usage,
            end,
        }
    }
}

/// Consume an SSE byte stream, accumulating text and the latest usage counters.
///
/// This never fails: cancellation, transport errors, an idle gap longer than
/// `idle_timeout` and provider error frames all end the loop with whatever
/// text has arrived so far, and the reason is reported in [`StreamEnd`].
pub async fn process_stream<S, B, E>(
    provider: Provider,
    stream: S,
    sink: &mut dyn StreamSink,
    cancel: &CancellationToken,
    idle_timeout: Option<Duration>,
) -> StreamOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut buffer: Vec<u8> = Vec::new();
    let mut acc = StreamAccumulator {
        text: String::new(),
        usage: TokenUsage::default(),
        sink,
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%provider, "stream cancelled by user");
                return acc.finish(StreamEnd::Cancelled);
            }
            next = next_chunk(&mut stream, idle_timeout) => next,
        };

        let chunk = match next {
            ChunkResult::Chunk(chunk) => chunk,
            ChunkResult::Closed => break,
            ChunkResult::Failed(reason) => {
                warn!(%provider, %reason, "stream interrupted");
                return acc.finish(StreamEnd::Failed(reason));
            }
        };

        buffer.extend_from_slice(chunk.as_ref());

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let raw_line: Vec<u8> = buffer.drain(..=newline_pos).collect();
            let line = match std::str::from_utf8(&raw_line) {
                Ok(line) => line,
                Err(err) => {
                    warn!(%provider, error = %err, "invalid UTF-8 in stream");
                    continue;
                }
            };
            if let Some(end) = acc.apply(decode_line(provider, line)) {
                if let StreamEnd::Failed(reason) = &end {
                    warn!(%provider, %reason, "provider reported an error mid-stream");
                }
                return acc.finish(end);
            }
        }
    }

    // A final frame may arrive without a trailing newline.
    if !buffer.is_empty() {
        if let Ok(line) = std::str::from_utf8(&buffer) {
            if let Some(end) = acc.apply(decode_line(provider, line)) {
                return acc.finish(end);
            }
        }
    }

    acc.finish(StreamEnd::Completed)
}

enum ChunkResult<B> {
    Chunk(B),
    Closed,
    Failed(String),
}

async fn next_chunk<S, B, E>(
    stream: &mut std::pin::Pin<&mut S>,
    idle_timeout: Option<Duration>,
) -> ChunkResult<B>
where
    S: Stream<Item = Result<B, E>>,
    E: Display,
{
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                return ChunkResult::Failed(format!(
                    "no data received for {} seconds",
                    limit.as_secs()
                ))
            }
        },
        None => stream.next().await,
    };

    match next {
        Some(Ok(chunk)) => ChunkResult::Chunk(chunk),
        Some(Err(err)) => ChunkResult::Failed(err.to_string()),
        None => ChunkResult::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    #[test]
    fn decode_line_handles_spacing_variants() {
        for line in [
            r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
            r#"data:{"choices":[{"delta":{"content":"Hello"}}]}"#,
        ] {
            assert_eq!(
                decode_line(Provider::OpenAi, line),
                StreamFrame::Data {
                    delta: Some("Hello".to_string()),
                    usage: None
                }
            );
        }
        assert_eq!(decode_line(Provider::OpenAi, "data: [DONE]"), StreamFrame::Done);
        assert_eq!(decode_line(Provider::OpenAi, "data:[DONE]"), StreamFrame::Done);
        assert_eq!(decode_line(Provider::OpenAi, ": keep-alive"), StreamFrame::Ignored);
    }

    #[test]
    fn decode_line_routes_error_frames() {
        let frame = decode_line(
            Provider::Gemini,
            r#"data: {"error":{"code":500,"message":"internal   server error"}}"#,
        );
        assert_eq!(frame, StreamFrame::Error("internal server error".to_string()));
    }

    #[test]
    fn gemini_frames_carry_text_and_usage() {
        let frame = decode_line(
            Provider::Gemini,
            r#"data: {"candidates":[{"content":{"parts":[{"text":"Hi"}]}}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":1,"totalTokenCount":4}}"#,
        );
        assert_eq!(
            frame,
            StreamFrame::Data {
                delta: Some("Hi".to_string()),
                usage: Some(TokenUsage::new(3, 1, None, Some(4)))
            }
        );
    }

    #[tokio::test]
    async fn openai_stream_accumulates_until_done() {
        let body = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);
        let mut mirrored = String::new();
        let cancel = CancellationToken::new();

        let outcome = process_stream(Provider::OpenAi, body, &mut mirrored, &cancel, None).await;

        assert_eq!(outcome.text, "Hello");
        assert_eq!(mirrored, "Hello");
        assert_eq!(outcome.usage, TokenUsage::new(5, 2, None, Some(7)));
        assert_eq!(outcome.end, StreamEnd::Completed);
    }

    #[tokio::test]
    async fn frames_split_across_chunks_are_reassembled() {
        let body = chunks(&[
            "data: {\"candidates\":[{\"content\":{\"par",
            "ts\":[{\"text\":\"A\"}]}}]}\r\n\r\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"B\"}]}}]}",
        ]);
        let cancel = CancellationToken::new();

        let outcome = process_stream(Provider::Gemini, body, &mut NullSink, &cancel, None).await;

        assert_eq!(outcome.text, "AB");
        assert_eq!(outcome.end, StreamEnd::Completed);
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let body = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n",
            "data: {not json\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n",
            "data: [DONE]\n",
        ]);
        let cancel = CancellationToken::new();

        let outcome = process_stream(Provider::OpenAi, body, &mut NullSink, &cancel, None).await;

        assert_eq!(outcome.text, "AB");
        assert_eq!(outcome.end, StreamEnd::Completed);
    }

    #[tokio::test]
    async fn transport_error_keeps_partial_text() {
        let body = stream::iter(vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"part\"}}]}\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let cancel = CancellationToken::new();

        let outcome = process_stream(Provider::OpenAi, body, &mut NullSink, &cancel, None).await;

        assert_eq!(outcome.text, "part");
        assert_eq!(outcome.end, StreamEnd::Failed("reset".to_string()));
    }

    #[tokio::test]
    async fn error_frame_ends_stream_with_partial_text() {
        let body = chunks(&[
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"so far\"}]}}]}\n",
            "data: {\"error\":{\"message\":\"quota exceeded\"}}\n",
        ]);
        let cancel = CancellationToken::new();

        let outcome = process_stream(Provider::Gemini, body, &mut NullSink, &cancel, None).await;

        assert_eq!(outcome.text, "so far");
        assert_eq!(outcome.end, StreamEnd::Failed("quota exceeded".to_string()));
    }

    #[tokio::test]
    async fn cancellation_stops_a_stalled_stream() {
        let body = stream::iter(vec![Ok::<_, std::io::Error>(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n".to_vec(),
        )])
        .chain(stream::pending());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = process_stream(Provider::OpenAi, body, &mut NullSink, &cancel, None).await;

        assert_eq!(outcome.text, "x");
        assert_eq!(outcome.end, StreamEnd::Cancelled);
    }

    #[tokio::test]
    async fn idle_timeout_fails_a_stalled_stream() {
        let body = stream::pending::<Result<Vec<u8>, std::io::Error>>();
        let cancel = CancellationToken::new();

        let outcome = process_stream(
            Provider::Gemini,
            body,
            &mut NullSink,
            &cancel,
            Some(Duration::from_millis(10)),
        )
        .await;

        assert!(matches!(outcome.end, StreamEnd::Failed(_)));
        assert!(outcome.text.is_empty());
    }
}
