//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, Fireworks AI,
//! and any OpenAI-compatible endpoint.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Embeddings
//! - Responses API with the `web_search_preview` tool
//! - Health checks

use async_trait::async_trait;
use futures::StreamExt;
use newsdesk_core::error::ProviderError;
use newsdesk_core::message::ConversationTurn;
use newsdesk_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
///
/// This handles the vast majority of LLM providers since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert conversation turns to OpenAI API format.
    fn to_api_messages(messages: &[ConversationTurn]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn chat_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        accept_sse: bool,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let url = format!("{}{path}", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");

        if accept_sse {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        check_status(response).await
    }
}

/// Map non-success HTTP statuses onto provider errors.
async fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

/// Result of parsing one SSE line.
#[derive(Debug, PartialEq)]
enum SseEvent {
    /// Blank line, comment, or an unparseable payload.
    Skip,
    Delta(String),
    Done(Option<Usage>),
}

fn parse_sse_line(line: &str) -> SseEvent {
    if line.is_empty() || line.starts_with(':') {
        return SseEvent::Skip;
    }

    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();

    // "[DONE]" signals end of stream
    if data == "[DONE]" {
        return SseEvent::Done(None);
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(stream_resp) => {
            // Usage arrives in the final chunk when stream_options asks for it
            if let Some(usage) = stream_resp.usage {
                return SseEvent::Done(Some(usage.into()));
            }
            stream_resp
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|c| !c.is_empty())
                .map_or(SseEvent::Skip, SseEvent::Delta)
        }
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            SseEvent::Skip
        }
    }
}

/// Accumulates raw SSE bytes and yields complete lines.
///
/// Decoding waits for the newline so a character split across network
/// reads is reassembled before it becomes text.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(line_end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=line_end).collect();
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            match std::str::from_utf8(line) {
                Ok(text) => lines.push(text.to_string()),
                Err(e) => {
                    warn!(error = %e, "Invalid UTF-8 in SSE line");
                    lines.push(String::from_utf8_lossy(line).into_owned());
                }
            }
        }
        lines
    }
}

/// Join every `output_text` item of a Responses API payload.
fn collect_output_text(response: &ResponsesApiResponse) -> String {
    if let Some(text) = response.output_text.as_deref().filter(|t| !t.is_empty()) {
        return text.to_string();
    }

    response
        .output
        .iter()
        .flat_map(|item| item.content.iter())
        .filter(|part| part.r#type == "output_text")
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl newsdesk_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = Self::chat_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self.post("/chat/completions", &body, false).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        Ok(ProviderResponse {
            message: ConversationTurn::assistant(choice.message.content.unwrap_or_default()),
            usage: api_response.usage.map(Usage::from),
            model: api_response.model,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self.post("/embeddings", &body, false).await?;

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        let mut data = api_resp.data;
        data.sort_by_key(|d| d.index);
        let embeddings = data.into_iter().map(|d| d.embedding).collect();

        let usage = api_resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: api_resp.model,
            usage,
        })
    }

    async fn web_search(
        &self,
        request: WebSearchRequest,
    ) -> std::result::Result<WebSearchResponse, ProviderError> {
        let body = serde_json::json!({
            "model": request.model,
            "tools": [{ "type": "web_search_preview" }],
            "input": request.input,
        });

        debug!(provider = %self.name, model = %request.model, "Sending web search request");

        let response = self.post("/responses", &body, false).await?;

        let api_resp: ResponsesApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse responses payload: {e}"))
        })?;

        let text = collect_output_text(&api_resp);
        if text.is_empty() {
            warn!(provider = %self.name, "Web search response carried no output text");
        }

        Ok(WebSearchResponse {
            text,
            model: api_resp.model.unwrap_or(request.model),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let body = Self::chat_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post("/chat/completions", &body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseEvent::Skip => {}
                        SseEvent::Delta(content) => {
                            let chunk = StreamChunk {
                                content: Some(content),
                                done: false,
                                usage: None,
                            };
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseEvent::Done(usage) => {
                            let _ = tx
                                .send(Ok(StreamChunk {
                                    content: None,
                                    done: true,
                                    usage,
                                }))
                                .await;
                            return;
                        }
                    }
                }
            }

            // Stream ended without [DONE], send final chunk
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage: None,
                }))
                .await;
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

// --- Responses API types ---

#[derive(Debug, Deserialize)]
struct ResponsesApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
    /// Convenience aggregate some servers include
    #[serde(default)]
    output_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(default)]
    content: Vec<ResponsesContentPart>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContentPart {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdesk_core::Provider;

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(provider.name(), "openai");
        assert!(provider.base_url.contains("api.openai.com"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("x", "http://localhost:1234/v1/", "k");
        assert_eq!(provider.base_url, "http://localhost:1234/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            ConversationTurn::system("You are helpful"),
            ConversationTurn::user("Hello"),
            ConversationTurn::assistant("Hi"),
        ];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 3);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(api_messages[2].role, "assistant");
    }

    #[test]
    fn chat_body_carries_sampling_settings() {
        let request = ProviderRequest::with_policy("gpt-3.5-turbo", "classify", &[])
            .temperature(0.0)
            .max_tokens(10);
        let body = OpenAiCompatProvider::chat_body(&request, false);
        assert_eq!(body["max_tokens"], 10);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["stream"], false);
        assert!(body.get("stream_options").is_none());

        let streamed = OpenAiCompatProvider::chat_body(&request, true);
        assert_eq!(streamed["stream_options"]["include_usage"], true);
    }

    // --- SSE parsing tests ---

    #[test]
    fn sse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Delta("Hello".into()));
    }

    #[test]
    fn sse_finish_chunk_without_content_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Skip);
    }

    #[test]
    fn sse_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done(None));
    }

    #[test]
    fn sse_usage_ends_stream() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        match parse_sse_line(line) {
            SseEvent::Done(Some(usage)) => {
                assert_eq!(usage.prompt_tokens, 10);
                assert_eq!(usage.total_tokens, 15);
            }
            other => panic!("expected usage, got {other:?}"),
        }
    }

    #[test]
    fn sse_comments_and_garbage_skipped() {
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(parse_sse_line(""), SseEvent::Skip);
        assert_eq!(parse_sse_line("data: {not json"), SseEvent::Skip);
        assert_eq!(parse_sse_line("event: ping"), SseEvent::Skip);
    }

    #[test]
    fn parse_embedding_response_in_index_order() {
        let data = r#"{
            "data": [
                {"embedding": [0.4, 0.5, 0.6], "index": 1},
                {"embedding": [0.1, 0.2, 0.3], "index": 0}
            ],
            "model": "text-embedding-ada-002",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        let mut items = parsed.data;
        items.sort_by_key(|d| d.index);
        assert_eq!(items[0].embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(parsed.model, "text-embedding-ada-002");
    }

    #[test]
    fn responses_output_text_collected() {
        let data = r#"{
            "model": "gpt-4.1",
            "output": [
                {"type": "web_search_call", "id": "ws_1", "status": "completed"},
                {"type": "message", "role": "assistant", "content": [
                    {"type": "output_text", "text": "The senate race was ", "annotations": []},
                    {"type": "output_text", "text": "called on Wednesday."}
                ]}
            ]
        }"#;
        let parsed: ResponsesApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(
            collect_output_text(&parsed),
            "The senate race was called on Wednesday."
        );
    }

    #[test]
    fn responses_aggregate_text_preferred() {
        let data = r#"{"output_text": "Short answer.", "output": []}"#;
        let parsed: ResponsesApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(collect_output_text(&parsed), "Short answer.");
    }

    // --- SSE line buffering ---

    #[test]
    fn line_buffer_reassembles_split_character() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(&line[..split]).is_empty());
        let lines = buffer.push(&line[split..]);
        assert_eq!(lines.len(), 1);
        assert_eq!(parse_sse_line(&lines[0]), SseEvent::Delta("café".into()));
    }

    #[test]
    fn line_buffer_strips_crlf_and_keeps_remainder() {
        let mut buffer = SseLineBuffer::default();
        let lines = buffer.push(b"data: [DONE]\r\n\r\ndata: {\"cho");
        assert_eq!(lines, vec!["data: [DONE]".to_string(), String::new()]);
        assert_eq!(buffer.pending, b"data: {\"cho");
    }

    /// Serve one SSE response whose body arrives in the given pieces.
    async fn serve_sse(pieces: Vec<Vec<u8>>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Read the request head and its JSON body
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
            socket.write_all(head.as_bytes()).await.unwrap();
            for piece in pieces {
                let mut frame = format!("{:x}\r\n", piece.len()).into_bytes();
                frame.extend_from_slice(&piece);
                frame.extend_from_slice(b"\r\n");
                socket.write_all(&frame).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
        });

        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn stream_keeps_multibyte_text_split_across_reads() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n\ndata: [DONE]\n\n".as_bytes();
        let split = body.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let base_url = serve_sse(vec![body[..split].to_vec(), body[split..].to_vec()]).await;

        let provider = OpenAiCompatProvider::new("local", base_url, "k");
        let request = ProviderRequest::with_policy("gpt-3.5-turbo", "rewrite", &[]).streaming();
        let rx = provider.stream(request).await.unwrap();
        let text = newsdesk_core::provider::collect_stream(rx).await.unwrap();
        assert_eq!(text, "café");
    }
}
