//! Streaming client for the Anthropic Messages API.
//!
//! Responses arrive as server-sent events. Thinking and text deltas are
//! forwarded to the caller's [`EventSink`] as they arrive; server-side web
//! search queries are reported once their input JSON is complete, and client
//! tool calls once their block closes.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::request::{
    EventSink, GenerationRequest, GenerativeService, Message, SearchHit, StreamEvent, Tool,
};
use crate::error::LlmError;

/// Default API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";

/// API version header value.
pub const API_VERSION: &str = "2023-06-01";

/// Streaming Messages API client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// Creates a client for the default API base.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Creates a client from `ANTHROPIC_API_KEY` and optional `ANTHROPIC_API_BASE`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] when the key is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| LlmError::MissingApiKey("ANTHROPIC_API_KEY".to_string()))?;
        let client = Self::new(api_key);
        Ok(match std::env::var("ANTHROPIC_API_BASE") {
            Ok(base) if !base.trim().is_empty() => client.with_base_url(base),
            _ => client,
        })
    }

    /// Builder method to override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ApiThinking>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ApiThinking {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

impl<'a> ApiRequest<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        let tools = request
            .tools
            .iter()
            .map(|tool| match tool {
                Tool::WebSearch { max_uses } => {
                    let mut tool = serde_json::json!({
                        "type": "web_search_20250305",
                        "name": "web_search",
                    });
                    if let Some(max_uses) = max_uses {
                        tool["max_uses"] = Value::from(*max_uses);
                    }
                    tool
                }
            })
            .collect();

        Self {
            model: &request.model,
            max_tokens: request.total_output_tokens(),
            system: &request.system,
            messages: &request.messages,
            stream: true,
            thinking: request.thinking.map(|effort| ApiThinking {
                kind: "enabled",
                budget_tokens: effort.budget_tokens(),
            }),
            tools,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

impl ApiErrorDetail {
    fn into_error(self) -> LlmError {
        if self.kind == "rate_limit_error" {
            LlmError::RateLimited(self.message)
        } else {
            LlmError::Stream(format!("{}: {}", self.kind, self.message))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseEvent {
    MessageStart {},
    ContentBlockStart { index: usize, content_block: Value },
    ContentBlockDelta { index: usize, delta: Delta },
    ContentBlockStop { index: usize },
    MessageDelta {},
    MessageStop,
    Ping,
    Error { error: ApiErrorDetail },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

/// Splits a byte stream into SSE `data` payloads.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Appends a chunk and returns the data payloads of every complete event.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let frame = String::from_utf8_lossy(&frame[..pos]);
            let data: Vec<&str> = frame
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|line| line.strip_prefix(' ').unwrap_or(line))
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }

        payloads
    }
}

#[derive(Debug)]
struct PendingTool {
    name: String,
    server: bool,
    json: String,
}

/// Accumulates the answer text and tool inputs across events.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    text: String,
    tools: HashMap<usize, PendingTool>,
    finished: bool,
}

impl StreamState {
    /// Applies one event payload. Returns `Ok(true)` once the message is complete.
    pub(crate) fn apply(&mut self, data: &str, sink: &EventSink) -> Result<bool, LlmError> {
        let event: SseEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(err) => {
                debug!(error = %err, "Skipping unparseable stream event");
                return Ok(false);
            }
        };

        match event {
            SseEvent::ContentBlockStart { index, content_block } => {
                self.start_block(index, &content_block, sink)
            }
            SseEvent::ContentBlockDelta { index, delta } => match delta {
                Delta::TextDelta { text } => {
                    self.text.push_str(&text);
                    sink.text(text);
                }
                Delta::ThinkingDelta { thinking } => {
                    sink.thinking(thinking);
                }
                Delta::InputJsonDelta { partial_json } => {
                    if let Some(tool) = self.tools.get_mut(&index) {
                        tool.json.push_str(&partial_json);
                    }
                }
                Delta::Other => {}
            },
            SseEvent::ContentBlockStop { index } => self.finish_block(index, sink),
            SseEvent::MessageStop => self.finished = true,
            SseEvent::Error { error } => return Err(error.into_error()),
            SseEvent::MessageStart {}
            | SseEvent::MessageDelta {}
            | SseEvent::Ping
            | SseEvent::Unknown => {}
        }

        Ok(self.finished)
    }

    fn start_block(&mut self, index: usize, block: &Value, sink: &EventSink) {
        let kind = block.get("type").and_then(Value::as_str).unwrap_or_default();
        let name = block
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match kind {
            "server_tool_use" => {
                let query = block
                    .get("input")
                    .and_then(|input| input.get("query"))
                    .and_then(Value::as_str);
                match query {
                    Some(query) => {
                        sink.emit(StreamEvent::WebSearch {
                            query: query.to_string(),
                        });
                    }
                    None => {
                        self.tools.insert(
                            index,
                            PendingTool {
                                name,
                                server: true,
                                json: String::new(),
                            },
                        );
                    }
                }
            }
            "tool_use" => {
                self.tools.insert(
                    index,
                    PendingTool {
                        name,
                        server: false,
                        json: String::new(),
                    },
                );
            }
            "web_search_tool_result" => {
                let hits: Vec<SearchHit> = block
                    .get("content")
                    .and_then(Value::as_array)
                    .map(|results| {
                        results
                            .iter()
                            .filter(|r| r.get("type").and_then(Value::as_str) == Some("web_search_result"))
                            .map(|r| SearchHit {
                                title: r.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
                                url: r.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
                                page_age: r.get("page_age").and_then(Value::as_str).map(str::to_string),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                if !hits.is_empty() {
                    sink.emit(StreamEvent::WebSearchResults(hits));
                }
            }
            _ => {}
        }
    }

    fn finish_block(&mut self, index: usize, sink: &EventSink) {
        let Some(tool) = self.tools.remove(&index) else {
            return;
        };
        let input: Value = if tool.json.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&tool.json) {
                Ok(input) => input,
                Err(_) => return,
            }
        };

        if tool.server {
            if let Some(query) = input.get("query").and_then(Value::as_str) {
                sink.emit(StreamEvent::WebSearch {
                    query: query.to_string(),
                });
            }
        } else {
            sink.emit(StreamEvent::ToolUse {
                name: tool.name,
                input,
            });
        }
    }

    /// Consumes the state and returns the accumulated answer text.
    pub(crate) fn into_text(self) -> String {
        self.text
    }
}

#[async_trait]
impl GenerativeService for AnthropicClient {
    async fn stream(&self, request: &GenerationRequest, sink: &EventSink) -> Result<String, LlmError> {
        let url = format!("{}/messages", self.base_url);
        let body = ApiRequest::from_request(request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&raw)
                .map(|parsed| parsed.error.message)
                .unwrap_or(raw);
            if code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError { code, message });
        }

        let mut decoder = SseDecoder::default();
        let mut state = StreamState::default();
        let mut bytes = response.bytes_stream();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
            for payload in decoder.push(&chunk) {
                if state.apply(&payload, sink)? {
                    break 'read;
                }
            }
        }

        debug!(label = %request.label, "Stream finished");
        Ok(state.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::request::ThinkingEffort;

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_request_body() {
        let request = GenerationRequest::new("syllabus", "claude-opus", "You design courses.")
            .with_user_message("Design a course")
            .with_thinking(ThinkingEffort::Max)
            .with_max_tokens(16_000)
            .with_tool(Tool::WebSearch { max_uses: Some(3) });
        let body = serde_json::to_value(ApiRequest::from_request(&request)).unwrap();

        assert_eq!(body["model"], "claude-opus");
        assert_eq!(body["max_tokens"], 48_000);
        assert_eq!(body["stream"], true);
        assert_eq!(body["thinking"]["budget_tokens"], 32_000);
        assert_eq!(body["tools"][0]["type"], "web_search_20250305");
        assert_eq!(body["tools"][0]["max_uses"], 3);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("label").is_none());
    }

    #[test]
    fn test_decoder_handles_split_frames() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: ping\ndata: {\"type\":").is_empty());
        let payloads = decoder.push(b"\"ping\"}\r\n\r\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
        assert_eq!(payloads, vec![r#"{"type":"ping"}"#, r#"{"type":"message_stop"}"#]);
    }

    #[test]
    fn test_state_collects_text_and_thinking() {
        let (sink, mut rx) = EventSink::channel();
        let mut state = StreamState::default();
        let events = [
            r#"{"type":"message_start","message":{"id":"m1"}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"x"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"[1,"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"2]"}}"#,
        ];
        for event in events {
            assert!(!state.apply(event, &sink).unwrap());
        }
        assert!(state.apply(r#"{"type":"message_stop"}"#, &sink).unwrap());
        assert_eq!(state.into_text(), "[1,2]");
        assert_eq!(
            drain(&mut rx),
            vec![
                StreamEvent::Thinking("hmm".into()),
                StreamEvent::Text("[1,".into()),
                StreamEvent::Text("2]".into()),
            ]
        );
    }

    #[test]
    fn test_state_reports_streamed_search_query() {
        let (sink, mut rx) = EventSink::channel();
        let mut state = StreamState::default();
        let events = [
            r#"{"type":"content_block_start","index":2,"content_block":{"type":"server_tool_use","name":"web_search","input":{}}}"#,
            r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"{\"query\": \"spacing "}}"#,
            r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"effect\"}"}}"#,
            r#"{"type":"content_block_stop","index":2}"#,
            r#"{"type":"content_block_start","index":3,"content_block":{"type":"web_search_tool_result","content":[{"type":"web_search_result","title":"T","url":"https://x"}]}}"#,
        ];
        for event in events {
            state.apply(event, &sink).unwrap();
        }
        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            StreamEvent::WebSearch {
                query: "spacing effect".into()
            }
        );
        assert!(matches!(&events[1], StreamEvent::WebSearchResults(hits) if hits[0].url == "https://x"));
    }

    #[test]
    fn test_state_reports_client_tool_use() {
        let (sink, mut rx) = EventSink::channel();
        let mut state = StreamState::default();
        state
            .apply(
                r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","name":"lookup","input":{}}}"#,
                &sink,
            )
            .unwrap();
        state
            .apply(
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"id\": 7}"}}"#,
                &sink,
            )
            .unwrap();
        state.apply(r#"{"type":"content_block_stop","index":0}"#, &sink).unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![StreamEvent::ToolUse {
                name: "lookup".into(),
                input: serde_json::json!({"id": 7}),
            }]
        );
    }

    #[test]
    fn test_stream_error_event_rate_limit() {
        let sink = EventSink::disabled();
        let mut state = StreamState::default();
        let err = state
            .apply(
                r#"{"type":"error","error":{"type":"rate_limit_error","message":"Too many"}}"#,
                &sink,
            )
            .unwrap_err();
        assert!(err.is_rate_limited());

        let err = state
            .apply(
                r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
                &sink,
            )
            .unwrap_err();
        assert!(matches!(err, LlmError::Stream(_)));
    }

    #[test]
    fn test_from_env_requires_key() {
        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            assert!(matches!(
                AnthropicClient::from_env(),
                Err(LlmError::MissingApiKey(_))
            ));
        }
    }
}
