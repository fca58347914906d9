//! Capability traits — the seams through which this crate calls out
//! to a scoring model, the guarded agent's own action generator, and a
//! sanitizer. Production callers supply real implementations; the
//! `testing` feature ships deterministic fakes in [`crate::testing`].

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Message, ToolCall};

/// The proxy's response to a single `score` call.
///
/// `logprobs[i]` is the natural-log probability of the `i`-th token of
/// `continuation` given everything before it (prompt plus prior
/// continuation tokens) — action tokens only, never prompt tokens.
/// `token_count` is `continuation`'s token count and must equal
/// `logprobs.len()`; the attribution engine treats a mismatch as
/// [`ProxyError`]-worthy inconsistency.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    /// Per-token log-probabilities of `continuation`, in order.
    pub logprobs: Vec<f64>,
    /// Number of tokens the proxy segmented `continuation` into.
    pub token_count: usize,
}

impl ScoreResult {
    /// Sum of `logprobs` — the variant's total log-probability.
    #[must_use]
    pub fn total_logprob(&self) -> f64 {
        self.logprobs.iter().sum()
    }
}

/// Errors a [`ProxyProvider`] call can fail with.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The underlying call (network, process, etc.) failed.
    #[error("proxy call failed: {0}")]
    CallFailed(String),
    /// The call exceeded its allotted time budget.
    #[error("proxy call timed out")]
    Timeout,
}

/// Scores a proposed continuation against a prompt under a (typically
/// small, fast) proxy model.
///
/// Implementations must be safe to call concurrently — the attribution
/// engine fans out `2 + |S|` calls against the same provider at once.
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// Return the log-probability the proxy assigns to `continuation`
    /// given `prompt`, along with the token count `continuation` was
    /// segmented into.
    async fn score(&self, prompt: &str, continuation: &str) -> Result<ScoreResult, ProxyError>;
}

/// Errors an [`ActionProvider`] call can fail with.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The underlying call failed.
    #[error("action generation failed: {0}")]
    CallFailed(String),
    /// The call exceeded its allotted time budget.
    #[error("action generation timed out")]
    Timeout,
}

/// Regenerates a proposed action from a (possibly sanitized or
/// CoT-masked) message sequence.
///
/// This is the guarded agent's own policy — the same thing that produced
/// the original action, invoked again on a defended context.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    /// Produce the action the agent would take given `messages`, or `None`
    /// if the agent declines to propose one — both are valid outcomes the
    /// defense pipeline handles.
    async fn propose(&self, messages: &[Message]) -> Result<Option<ToolCall>, ActionError>;
}

/// Errors a [`SanitizerProvider`] call can fail with.
#[derive(Debug, Error)]
pub enum SanitizerError {
    /// The underlying call failed.
    #[error("sanitization failed: {0}")]
    CallFailed(String),
    /// The call exceeded its allotted time budget.
    #[error("sanitization timed out")]
    Timeout,
}

/// Rewrites a single untrusted span to strip suspected injected
/// instructions while preserving its informational content.
#[async_trait]
pub trait SanitizerProvider: Send + Sync {
    /// Return a sanitized version of `span_content`, which came from
    /// `tool_name`.
    async fn sanitize(&self, tool_name: &str, span_content: &str) -> Result<String, SanitizerError>;
}
