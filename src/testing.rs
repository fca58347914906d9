//! In-memory fake capability providers, gated behind the `testing`
//! feature so integration tests — and downstream consumers writing their
//! own — don't need a live model backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::{Message, ToolCall};
use crate::providers::{
    ActionError, ActionProvider, ProxyError, ProxyProvider, SanitizerError, SanitizerProvider,
    ScoreResult,
};

/// A deterministic fake proxy keyed by the rendered prompt.
///
/// Tests register an expected total log-probability per prompt via
/// [`FakeProxy::with_response`]; `score` looks up the prompt verbatim and
/// fails the call if it wasn't registered, so a missing fixture surfaces
/// as a loud test failure rather than a silently wrong score.
#[derive(Debug, Default)]
pub struct FakeProxy {
    responses: Mutex<HashMap<String, (f64, usize)>>,
}

impl FakeProxy {
    /// Create an empty fake proxy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the response for an exact `prompt` + `continuation`
    /// concatenation: `total_logprob` split evenly across `token_count`
    /// tokens.
    #[must_use]
    pub fn with_response(
        self,
        prompt: impl AsRef<str>,
        continuation: impl AsRef<str>,
        total_logprob: f64,
        token_count: usize,
    ) -> Self {
        let key = format!("{}\u{0}{}", prompt.as_ref(), continuation.as_ref());
        self.responses
            .lock()
            .unwrap()
            .insert(key, (total_logprob, token_count));
        self
    }
}

#[async_trait]
impl ProxyProvider for FakeProxy {
    async fn score(&self, prompt: &str, continuation: &str) -> Result<ScoreResult, ProxyError> {
        let key = format!("{prompt}\u{0}{continuation}");
        let (total_logprob, token_count) = *self
            .responses
            .lock()
            .unwrap()
            .get(&key)
            .ok_or_else(|| ProxyError::CallFailed(format!("no fixture registered for prompt: {prompt:?}")))?;
        let per_token = total_logprob / token_count as f64;
        Ok(ScoreResult {
            logprobs: vec![per_token; token_count],
            token_count,
        })
    }
}

/// A fake action provider that always returns the same preconfigured
/// action (or, if constructed with `None`, always declines).
pub struct FakeActionProvider {
    action: Option<ToolCall>,
}

impl FakeActionProvider {
    /// Always propose `action`.
    #[must_use]
    pub fn always(action: ToolCall) -> Self {
        Self { action: Some(action) }
    }

    /// Always decline to propose an action.
    #[must_use]
    pub fn declining() -> Self {
        Self { action: None }
    }
}

#[async_trait]
impl ActionProvider for FakeActionProvider {
    async fn propose(&self, _messages: &[Message]) -> Result<Option<ToolCall>, ActionError> {
        Ok(self.action.clone())
    }
}

/// A fake sanitizer that either always fails, or rewrites content through
/// a caller-supplied pure function.
pub struct FakeSanitizer {
    rewrite: Box<dyn Fn(&str, &str) -> String + Send + Sync>,
}

impl FakeSanitizer {
    /// Sanitize by applying `rewrite(tool_name, content)`.
    #[must_use]
    pub fn new(rewrite: impl Fn(&str, &str) -> String + Send + Sync + 'static) -> Self {
        Self {
            rewrite: Box::new(rewrite),
        }
    }

    /// A sanitizer that strips the literal substring `"ignore"` (case
    /// sensitive) — enough for scenario tests that plant that marker in
    /// injected content.
    #[must_use]
    pub fn stripping_imperatives() -> Self {
        Self::new(|_tool_name, content| content.replace("ignore", "[removed]"))
    }

    /// A sanitizer that always fails.
    #[must_use]
    pub fn failing() -> FailingSanitizer {
        FailingSanitizer
    }
}

#[async_trait]
impl SanitizerProvider for FakeSanitizer {
    async fn sanitize(&self, tool_name: &str, span_content: &str) -> Result<String, SanitizerError> {
        Ok((self.rewrite)(tool_name, span_content))
    }
}

/// A sanitizer that always fails, for exercising [`crate::defense::DefenseError::SanitizationFailure`].
pub struct FailingSanitizer;

#[async_trait]
impl SanitizerProvider for FailingSanitizer {
    async fn sanitize(&self, _tool_name: &str, _span_content: &str) -> Result<String, SanitizerError> {
        Err(SanitizerError::CallFailed("fake sanitizer configured to fail".into()))
    }
}

/// A proxy that always fails, for exercising [`crate::attribution::AttributionError::ProxyFailure`].
pub struct FailingProxy;

#[async_trait]
impl ProxyProvider for FailingProxy {
    async fn score(&self, _prompt: &str, _continuation: &str) -> Result<ScoreResult, ProxyError> {
        Err(ProxyError::CallFailed("fake proxy configured to fail".into()))
    }
}
