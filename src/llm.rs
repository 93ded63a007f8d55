//! Conversation abstraction over LLM providers.
//!
//! The engine talks to a [`Conversationalist`] factory that opens
//! [`Conversation`]s: a system-prompted message exchange that returns the
//! assistant's text. Providers classify their failures as retryable or
//! fatal; retries (bounded, with the backoff table below) live inside the
//! provider, so callers see a single `send` future per message.
//!
//! The `#[async_trait]` macro is required because the proposer stores
//! conversations as `Box<dyn Conversation>`; native async fn in traits is
//! not object-safe.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use renamebot_core::RenamebotError;

/// Default model id when the caller passes an empty model option.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Backoff table for retryable provider errors: starts in the tens of
/// milliseconds and is capped at ten seconds. One attempt per entry after
/// the initial try.
pub const RETRY_DELAYS: [Duration; 6] = [
    Duration::from_millis(50),
    Duration::from_millis(150),
    Duration::from_millis(400),
    Duration::from_millis(1_000),
    Duration::from_millis(3_000),
    Duration::from_millis(10_000),
];

/// A provider failure.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Transient: rate limits, 5xx-class responses, network hiccups. The
    /// provider retries these itself; one surfacing here means retries were
    /// exhausted.
    #[error("retryable provider error: {0}")]
    Retryable(String),

    /// Permanent: authentication, malformed request, response shape.
    #[error("provider error: {0}")]
    Fatal(String),

    /// The send was cancelled by the caller.
    #[error("conversation cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Retryable(_))
    }
}

impl From<LlmError> for RenamebotError {
    fn from(err: LlmError) -> Self {
        let retryable = err.is_retryable();
        RenamebotError::Llm {
            message: err.to_string(),
            retryable,
        }
    }
}

/// One system-prompted exchange with a model.
#[async_trait]
pub trait Conversation: Send {
    /// Append a user message to the conversation.
    fn add_user_message(&mut self, text: &str);

    /// Send the conversation and return the assistant's reply text.
    async fn send(&mut self) -> Result<String, LlmError>;
}

/// Factory for conversations against one provider.
pub trait Conversationalist: Send + Sync {
    /// Open a conversation with the given model id and system message.
    fn new_conversation(&self, model: &str, system_message: &str) -> Box<dyn Conversation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_table_is_monotonic_and_capped() {
        for pair in RETRY_DELAYS.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(RETRY_DELAYS[0] >= Duration::from_millis(10));
        assert_eq!(*RETRY_DELAYS.last().expect("nonempty"), Duration::from_secs(10));
    }

    #[test]
    fn retryable_classification() {
        assert!(LlmError::Retryable("429".to_string()).is_retryable());
        assert!(!LlmError::Fatal("401".to_string()).is_retryable());
        assert!(!LlmError::Cancelled.is_retryable());
    }

    #[test]
    fn bridges_into_unified_error() {
        let err: RenamebotError = LlmError::Retryable("503".to_string()).into();
        match err {
            RenamebotError::Llm { retryable, .. } => assert!(retryable),
            other => panic!("unexpected bridge target: {other}"),
        }
    }

    #[test]
    fn conversation_trait_is_object_safe() {
        fn _assert_object_safe(_: Box<dyn Conversation>) {}
        fn _assert_factory_object_safe(_: Box<dyn Conversationalist>) {}
    }
}
