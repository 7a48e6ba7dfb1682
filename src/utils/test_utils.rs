use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::core::api_client::{ChatBackend, ChatReply, ChatRequest};
use crate::core::chat_stream::{StreamEnd, StreamSink};
use crate::core::error::{ApiErrorKind, ApiRequestError};
use crate::core::provider::Provider;
use crate::core::usage::TokenUsage;

/// One canned HTTP response served by [`spawn_mock_server`].
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }

    pub fn sse(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}

pub struct MockServer {
    base_url: String,
    captured: Arc<tokio::sync::Mutex<Vec<CapturedRequest>>>,
}

impl MockServer {
    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().await.clone()
    }
}

/// Serve `responses` in order, one per connection, on a local port.
pub async fn spawn_mock_server(responses: Vec<MockResponse>) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let captured = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let captured_for_server = Arc::clone(&captured);

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let Ok((request_line, headers, body)) = read_http_request(&mut stream).await else {
                return;
            };
            captured_for_server.lock().await.push(CapturedRequest {
                request_line,
                headers,
                body,
            });
            let head = format!(
                "HTTP/1.1 {} Mock\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                response.status,
                response.content_type,
                response.body.len()
            );
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(response.body.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    MockServer {
        base_url: format!("http://{addr}"),
        captured,
    }
}

async fn read_http_request(
    stream: &mut TcpStream,
) -> Result<(String, Vec<(String, String)>, Vec<u8>), String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.unwrap_or(buffer.len());
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok((request_line, headers, body))
}

/// A reply a [`ScriptedBackend`] hands out, optionally after a delay.
pub struct ScriptedReply {
    pub result: Result<ChatReply, ApiRequestError>,
    pub delay: Duration,
}

impl ScriptedReply {
    pub fn ok(text: &str, usage: TokenUsage) -> Self {
        Self {
            result: Ok(ChatReply {
                text: text.to_string(),
                usage,
                end: StreamEnd::Completed,
            }),
            delay: Duration::ZERO,
        }
    }

    pub fn err(message: &str) -> Self {
        Self {
            result: Err(ApiRequestError::new(ApiErrorKind::Status(500), message)),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory [`ChatBackend`] returning queued replies per provider and
/// recording every request it receives.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<HashMap<Provider, VecDeque<ScriptedReply>>>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, provider: Provider, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap()
            .entry(provider)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(
        &self,
        request: ChatRequest,
        sink: &mut dyn StreamSink,
        _cancel: &CancellationToken,
    ) -> Result<ChatReply, ApiRequestError> {
        let provider = request.engine.provider();
        let stream = request.stream;
        self.calls.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&provider)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ScriptedReply::err("no scripted reply"));

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        if let Ok(chat) = &reply.result {
            if stream {
                sink.on_delta(&chat.text);
            }
        }
        reply.result
    }
}
