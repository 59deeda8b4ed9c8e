//! Generative service integration for course-forge.
//!
//! The pipeline talks to models through the [`GenerativeService`] trait: one
//! streaming call per request, with incremental [`StreamEvent`]s delivered
//! through an [`EventSink`] while the call is in flight. [`stream_with_retry`]
//! adds the rate-limit retry policy on top of any service.
//!
//! ```ignore
//! use course_forge::llm::{stream_with_retry, AnthropicClient, EventSink, GenerationRequest, RetryPolicy};
//!
//! let client = AnthropicClient::from_env()?;
//! let (sink, mut events) = EventSink::channel();
//! let request = GenerationRequest::new("demo", "claude-sonnet-4-5-20250929", "Be brief.")
//!     .with_user_message("Name one learning-science principle.");
//! let text = stream_with_retry(&client, &request, Some(&sink), &RetryPolicy::default()).await?;
//! ```

pub mod anthropic;
pub mod image;
pub mod request;
pub mod retry;
pub mod speech;

pub use anthropic::AnthropicClient;
pub use image::{GeminiImageClient, GeneratedImage, ImageGenerator};
pub use request::{
    EventSink, GenerationRequest, GenerativeService, Message, SearchHit, StreamEvent,
    ThinkingEffort, Tool,
};
pub use retry::{stream_events, stream_with_retry, Backoff, CallEvent, RetryPolicy};
pub use speech::{chunk_transcript, ElevenLabsClient, GeneratedSpeech, SpeechGenerator};
