//! Attribution engine — bounded-concurrency leave-one-out scoring.
//!
//! For a context with `|S|` untrusted spans, this module builds `2 + |S|`
//! ablation variants (base, user-ablated, one per span), scores each one
//! concurrently against a [`ProxyProvider`], and normalizes the resulting
//! deltas per action token.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::trace;

use crate::context::StructuredContext;
use crate::model::ToolCall;
use crate::providers::{ProxyError, ProxyProvider};

/// The result of running leave-one-out attribution over one `StructuredContext`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionResult {
    /// Total log-probability of the action under the unablated context.
    pub base_logprob: f64,
    /// Normalized influence of the user request.
    pub user_delta: f64,
    /// Normalized influence of each untrusted span, same order as
    /// [`StructuredContext::untrusted_spans`].
    pub span_deltas: Vec<f64>,
    /// Action token count, consistent across every variant that was scored.
    pub action_token_count: usize,
}

/// Errors the attribution engine can fail with.
#[derive(Debug, Error)]
pub enum AttributionError {
    /// A scoring call to the proxy failed outright.
    #[error("proxy scoring failed: {0}")]
    ProxyFailure(#[from] ProxyError),
    /// The proxy's responses across variants were not mutually consistent
    /// (unequal action token counts, or fewer logprobs than tokens).
    #[error("proxy returned inconsistent variants: {0}")]
    ProxyInconsistency(String),
}

/// One variant to score: a label (for ordering/diagnostics) and its
/// message sequence.
enum Variant {
    Base,
    UserAblated,
    SpanAblated(usize),
}

/// Run leave-one-out attribution for `action` over `context`, scoring each
/// of `2 + |S|` variants concurrently against `proxy`.
///
/// `max_in_flight` bounds how many scoring calls may be outstanding at
/// once via a semaphore created fresh for this call; `None` means
/// unbounded. `per_call_timeout`, if set, cancels any single scoring call
/// that outlives it, failing the whole attribution with
/// [`AttributionError::ProxyFailure`].
///
/// On the first failing variant, every other in-flight scoring task is
/// aborted before the error is returned.
pub async fn attribute(
    context: &StructuredContext,
    action: &ToolCall,
    proxy: &Arc<dyn ProxyProvider>,
    max_in_flight: Option<usize>,
    per_call_timeout: Option<std::time::Duration>,
) -> Result<AttributionResult, AttributionError> {
    let span_count = context.untrusted_spans.len();
    let mut variants = Vec::with_capacity(2 + span_count);
    variants.push(Variant::Base);
    variants.push(Variant::UserAblated);
    for i in 0..span_count {
        variants.push(Variant::SpanAblated(i));
    }

    let semaphore = max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1))));

    let mut join_set = JoinSet::new();
    for (idx, variant) in variants.into_iter().enumerate() {
        let messages = match variant {
            Variant::Base => context.all_messages.clone(),
            Variant::UserAblated => context.with_user_ablated(),
            Variant::SpanAblated(i) => context.with_span_ablated(i),
        };
        let prompt = crate::context::serialize_messages(&messages);
        let continuation = action.raw_text.clone();
        let proxy = Arc::clone(proxy);
        let semaphore = semaphore.clone();
        let timeout = per_call_timeout;

        trace!(variant = idx, "dispatching proxy scoring call");
        join_set.spawn(async move {
            let _permit = match &semaphore {
                Some(sem) => Some(
                    Arc::clone(sem)
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed"),
                ),
                None => None,
            };
            let call = proxy.score(&prompt, &continuation);
            let result = match timeout {
                Some(d) => match tokio::time::timeout(d, call).await {
                    Ok(r) => r,
                    Err(_) => Err(ProxyError::Timeout),
                },
                None => call.await,
            };
            (idx, result)
        });
    }

    let mut slots: Vec<Option<crate::providers::ScoreResult>> =
        (0..2 + span_count).map(|_| None).collect();

    let mut failure: Option<AttributionError> = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, Ok(score))) => slots[idx] = Some(score),
            Ok((_, Err(err))) => {
                if failure.is_none() {
                    failure = Some(AttributionError::ProxyFailure(err));
                }
            }
            Err(join_err) => {
                if failure.is_none() {
                    failure = Some(AttributionError::ProxyFailure(ProxyError::CallFailed(
                        join_err.to_string(),
                    )));
                }
            }
        }
        if failure.is_some() {
            join_set.abort_all();
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }

    let scores: Vec<crate::providers::ScoreResult> = slots
        .into_iter()
        .map(|slot| slot.expect("every variant index was scored"))
        .collect();

    let action_token_count = scores[0].token_count;
    for score in &scores {
        if score.token_count != action_token_count {
            return Err(AttributionError::ProxyInconsistency(format!(
                "expected {action_token_count} action tokens, found variant with {}",
                score.token_count
            )));
        }
        if score.logprobs.len() != score.token_count {
            return Err(AttributionError::ProxyInconsistency(format!(
                "token_count {} does not match logprobs length {}",
                score.token_count,
                score.logprobs.len()
            )));
        }
    }
    if action_token_count == 0 {
        return Err(AttributionError::ProxyInconsistency(
            "action token count must be positive".into(),
        ));
    }

    let base_logprob = scores[0].total_logprob();
    let normalize = |variant_logprob: f64| (base_logprob - variant_logprob) / action_token_count as f64;

    let user_delta = normalize(scores[1].total_logprob());
    let span_deltas = scores[2..]
        .iter()
        .map(|s| normalize(s.total_logprob()))
        .collect();

    Ok(AttributionResult {
        base_logprob,
        user_delta,
        span_deltas,
        action_token_count,
    })
}
