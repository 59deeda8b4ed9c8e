//! Retrying wrapper around a streaming call.
//!
//! [`stream_with_retry`] retries calls that fail with a rate-limit signature
//! and propagates every other failure immediately. Each attempt streams into
//! its own channel whose events are forwarded to the caller's sink in order;
//! the channel is closed as soon as the attempt resolves, so nothing emitted
//! after a terminal state ever reaches the caller. Before every retry the
//! caller's sink receives [`StreamEvent::Retrying`], so consumers that
//! accumulate text can discard the abandoned attempt.
//!
//! [`stream_events`] exposes the same call as an ordered [`Stream`] of
//! [`CallEvent`]s that ends right after its terminal item.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::request::{EventSink, GenerationRequest, GenerativeService, StreamEvent};
use crate::error::LlmError;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between rate-limited attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_500);

/// Growth of the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `(attempt + 1) * base`
    Linear,
    /// `2^attempt * base`
    Exponential,
}

/// Retry policy for rate-limited calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay.
    pub base_delay: Duration,
    /// Delay growth.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Builder method to set the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder method to set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Builder method to set the backoff shape.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to wait after the failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
            Backoff::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt.min(16))),
        }
    }
}

fn forward(sink: Option<&EventSink>, event: StreamEvent) {
    if let Some(sink) = sink {
        sink.emit(event);
    }
}

/// Runs `request` against `service`, retrying rate-limited failures.
///
/// Incremental events from every attempt are forwarded to `sink` while the
/// call is in flight. After this function returns, no further events are
/// delivered for this call.
///
/// # Errors
///
/// Returns the last error when it is not rate limited or when the retries
/// are exhausted.
pub async fn stream_with_retry(
    service: &dyn GenerativeService,
    request: &GenerationRequest,
    sink: Option<&EventSink>,
    policy: &RetryPolicy,
) -> Result<String, LlmError> {
    let mut attempt = 0u32;

    loop {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let attempt_sink = EventSink::new(tx);

        let result = {
            let call = service.stream(request, &attempt_sink);
            tokio::pin!(call);
            loop {
                tokio::select! {
                    biased;
                    result = &mut call => break result,
                    Some(event) = rx.recv() => forward(sink, event),
                }
            }
        };

        rx.close();
        while let Ok(event) = rx.try_recv() {
            forward(sink, event);
        }
        drop(attempt_sink);

        match result {
            Ok(text) => {
                debug!(label = %request.label, attempt = attempt + 1, chars = text.len(), "Call completed");
                return Ok(text);
            }
            Err(err) if err.is_rate_limited() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    label = %request.label,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                forward(sink, StreamEvent::Retrying { attempt });
            }
            Err(err) => {
                warn!(label = %request.label, attempt = attempt + 1, error = %err, "Call failed");
                return Err(err);
            }
        }
    }
}

/// One item of a [`stream_events`] stream.
#[derive(Debug)]
pub enum CallEvent {
    /// An incremental event from the call.
    Token(StreamEvent),
    /// The call resolved with the full text. Always the last item.
    Completed(String),
    /// The call failed. Always the last item.
    Failed(LlmError),
}

impl CallEvent {
    /// True for [`CallEvent::Completed`] and [`CallEvent::Failed`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallEvent::Completed(_) | CallEvent::Failed(_))
    }
}

enum Step {
    Event(StreamEvent),
    Done(Result<String, LlmError>),
}

/// Runs a retrying call and yields its events followed by one terminal item.
pub fn stream_events(
    service: Arc<dyn GenerativeService>,
    request: GenerationRequest,
    policy: RetryPolicy,
) -> impl Stream<Item = CallEvent> + Send {
    async_stream::stream! {
        let (sink, mut rx) = EventSink::channel();
        let result = {
            let call = stream_with_retry(service.as_ref(), &request, Some(&sink), &policy);
            tokio::pin!(call);
            loop {
                let step = tokio::select! {
                    biased;
                    Some(event) = rx.recv() => Step::Event(event),
                    result = &mut call => Step::Done(result),
                };
                match step {
                    Step::Event(event) => yield CallEvent::Token(event),
                    Step::Done(result) => break result,
                }
            }
        };

        drop(sink);
        while let Some(event) = rx.recv().await {
            yield CallEvent::Token(event);
        }

        match result {
            Ok(text) => yield CallEvent::Completed(text),
            Err(err) => yield CallEvent::Failed(err),
        }
    }
}
