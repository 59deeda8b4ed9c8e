//! Request and event types for the generative service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::LlmError;

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender ("user" or "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// How much hidden reasoning the model may spend before answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingEffort {
    Low,
    Medium,
    High,
    Max,
}

impl ThinkingEffort {
    /// Reasoning token budget for this effort level.
    pub fn budget_tokens(self) -> u32 {
        match self {
            ThinkingEffort::Low => 4_000,
            ThinkingEffort::Medium => 8_000,
            ThinkingEffort::High => 16_000,
            ThinkingEffort::Max => 32_000,
        }
    }
}

/// Server-side tools the model may call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    /// Web search executed by the service; queries surface as [`StreamEvent::WebSearch`].
    WebSearch { max_uses: Option<u32> },
}

/// A request to the generative service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Correlation label for logs (never sent to the service).
    pub label: String,
    /// Model identifier.
    pub model: String,
    /// System prompt.
    pub system: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Tools available to the model.
    pub tools: Vec<Tool>,
    /// Optional reasoning budget.
    pub thinking: Option<ThinkingEffort>,
    /// Maximum number of answer tokens.
    pub max_tokens: u32,
}

impl GenerationRequest {
    /// Create a new request with a system prompt and no messages.
    pub fn new(label: impl Into<String>, model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            model: model.into(),
            system: system.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            thinking: None,
            max_tokens: 16_000,
        }
    }

    /// Builder method to append a user message.
    pub fn with_user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    /// Builder method to add a tool.
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Builder method to set the reasoning budget.
    pub fn with_thinking(mut self, effort: ThinkingEffort) -> Self {
        self.thinking = Some(effort);
        self
    }

    /// Builder method to set maximum answer tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Total output tokens to request, reasoning budget included.
    pub fn total_output_tokens(&self) -> u32 {
        match self.thinking {
            Some(effort) => self.max_tokens.saturating_add(effort.budget_tokens()),
            None => self.max_tokens,
        }
    }
}

/// A web search hit reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub page_age: Option<String>,
}

/// Incremental output of a streaming call.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Reasoning-trace tokens.
    Thinking(String),
    /// Answer tokens.
    Text(String),
    /// A client tool call with its input.
    ToolUse { name: String, input: Value },
    /// A server-side web search was issued.
    WebSearch { query: String },
    /// Results of a server-side web search.
    WebSearchResults(Vec<SearchHit>),
    /// The previous attempt was rate limited and the call starts over.
    /// Text received before this marker belongs to the abandoned attempt.
    Retrying { attempt: u32 },
}

/// Destination for [`StreamEvent`]s produced during a call.
///
/// Emitting never blocks. Once the receiving side is closed, events are
/// dropped and [`EventSink::emit`] returns `false`.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl EventSink {
    /// Creates a sink that forwards into `tx`.
    pub fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Creates a sink that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Creates a sink together with the receiver for its events.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Emits an event. Returns `false` if it was dropped.
    pub fn emit(&self, event: StreamEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Convenience for [`StreamEvent::Text`].
    pub fn text(&self, delta: impl Into<String>) -> bool {
        self.emit(StreamEvent::Text(delta.into()))
    }

    /// Convenience for [`StreamEvent::Thinking`].
    pub fn thinking(&self, delta: impl Into<String>) -> bool {
        self.emit(StreamEvent::Thinking(delta.into()))
    }
}

/// A streaming generative text service.
///
/// Implementations report incremental output through `sink` while the call
/// is in flight and return the full answer text. Rate limiting must surface
/// as an error for which [`LlmError::is_rate_limited`] is true.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    /// Runs one call and returns the complete answer text.
    async fn stream(&self, request: &GenerationRequest, sink: &EventSink) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("research-ch01", "claude-sonnet", "You research.")
            .with_user_message("Find sources")
            .with_tool(Tool::WebSearch { max_uses: Some(5) })
            .with_thinking(ThinkingEffort::Medium)
            .with_max_tokens(4_000);

        assert_eq!(request.label, "research-ch01");
        assert_eq!(request.messages, vec![Message::user("Find sources")]);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.total_output_tokens(), 12_000);
    }

    #[test]
    fn test_thinking_budgets() {
        assert_eq!(ThinkingEffort::Low.budget_tokens(), 4_000);
        assert_eq!(ThinkingEffort::Medium.budget_tokens(), 8_000);
        assert_eq!(ThinkingEffort::High.budget_tokens(), 16_000);
        assert_eq!(ThinkingEffort::Max.budget_tokens(), 32_000);
    }

    #[test]
    fn test_sink_closed_receiver_drops_events() {
        let (sink, mut rx) = EventSink::channel();
        assert!(sink.text("a"));
        rx.close();
        assert!(!sink.text("b"));
        assert_eq!(rx.try_recv().ok(), Some(StreamEvent::Text("a".to_string())));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_sink() {
        assert!(!EventSink::disabled().thinking("x"));
    }
}
