//! Defense pipeline — sanitize flagged spans, mask chain-of-thought,
//! regenerate, and enforce the no-fallback-to-original-action guarantee.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, trace, warn};

use crate::attribution::AttributionResult;
use crate::context::{mask_assistant_after, StructuredContext};
use crate::detection::DetectionResult;
use crate::model::{Message, ToolCall};
use crate::providers::{ActionError, ActionProvider, SanitizerError, SanitizerProvider};

/// The outcome of running the defense pipeline (or of a clean pass-through,
/// constructed by the orchestrator directly).
#[derive(Debug, Clone, PartialEq)]
pub struct DefenseResult {
    /// The action the caller originally proposed.
    pub original_action: ToolCall,
    /// The action the caller should actually execute.
    pub final_action: ToolCall,
    /// Whether defense rewrote the action (sanitize/mask/regenerate ran).
    pub was_defended: bool,
    /// The detection verdict that led to this result.
    pub detection: DetectionResult,
    /// The attribution result, if attribution ran.
    pub attribution: Option<AttributionResult>,
    /// Sanitized replacement content, keyed by span index.
    pub sanitized_spans: HashMap<usize, String>,
}

/// Errors the defense pipeline can fail with.
#[derive(Debug, Error)]
pub enum DefenseError {
    /// The sanitizer failed for at least one flagged span.
    #[error("sanitization failed: {0}")]
    SanitizationFailure(#[from] SanitizerError),
    /// The action provider itself raised an error during regeneration.
    #[error("regeneration failed: {0}")]
    RegenerationFailure(#[from] ActionError),
}

/// Run the defense pipeline for a positive detection.
///
/// Never returns `final_action == original_action`: on any internal
/// failure this falls back to a [`ToolCall::stripped`] action rather than
/// propagating the original (possibly attacker-controlled) one. Errors
/// from this function are informational for logging only — the
/// orchestrator always has a valid [`DefenseResult`] to return, so callers
/// that only want the strict no-fallback guarantee can treat `Err` the
/// same way they treat a stripped-action `Ok`.
#[allow(clippy::too_many_arguments)]
pub async fn defend(
    context: &StructuredContext,
    original_action: &ToolCall,
    detection: DetectionResult,
    attribution: Option<AttributionResult>,
    enable_sanitization: bool,
    enable_cot_masking: bool,
    sanitizer: &Arc<dyn SanitizerProvider>,
    action_provider: &Arc<dyn ActionProvider>,
) -> DefenseResult {
    let sanitized_spans = if enable_sanitization {
        match sanitize_flagged_spans(context, &detection, sanitizer).await {
            Ok(sanitized) => sanitized,
            Err(err) => {
                warn!(error = %err, "sanitization failed, falling back to stripped action");
                return DefenseResult {
                    original_action: original_action.clone(),
                    final_action: ToolCall::stripped(original_action.name.clone()),
                    was_defended: true,
                    detection,
                    attribution,
                    sanitized_spans: HashMap::new(),
                };
            }
        }
    } else {
        HashMap::new()
    };

    let rebuilt = rebuild_with_sanitized_spans(context, &sanitized_spans);

    let masked = if enable_cot_masking {
        let earliest_flagged = detection
            .flagged_span_indices
            .iter()
            .map(|&i| context.untrusted_spans[i].message_index)
            .min();
        mask_assistant_after(&rebuilt, earliest_flagged)
    } else {
        rebuilt
    };

    let final_action = match action_provider.propose(&masked).await {
        Ok(Some(action)) => action,
        Ok(None) => {
            info!(name = %original_action.name, "action provider declined to propose a replacement, stripping action");
            ToolCall::stripped(original_action.name.clone())
        }
        Err(err) => {
            warn!(error = %err, "regeneration failed, falling back to stripped action");
            ToolCall::stripped(original_action.name.clone())
        }
    };

    info!(
        flagged = detection.flagged_span_indices.len(),
        "defense pipeline rewrote the proposed action"
    );

    DefenseResult {
        original_action: original_action.clone(),
        final_action,
        was_defended: true,
        detection,
        attribution,
        sanitized_spans,
    }
}

/// Sanitize every flagged span concurrently; fail the whole call on the
/// first sanitizer error.
async fn sanitize_flagged_spans(
    context: &StructuredContext,
    detection: &DetectionResult,
    sanitizer: &Arc<dyn SanitizerProvider>,
) -> Result<HashMap<usize, String>, SanitizerError> {
    let mut join_set = JoinSet::new();
    for &span_index in &detection.flagged_span_indices {
        let span = context.untrusted_spans[span_index].clone();
        let sanitizer = Arc::clone(sanitizer);
        trace!(span = span_index, tool = %span.tool_name, "dispatching sanitizer call");
        join_set.spawn(async move {
            let result = sanitizer.sanitize(&span.tool_name, &span.content).await;
            (span_index, result)
        });
    }

    let mut sanitized = HashMap::new();
    let mut failure: Option<SanitizerError> = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((span_index, Ok(content))) => {
                sanitized.insert(span_index, content);
            }
            Ok((_, Err(err))) => {
                if failure.is_none() {
                    failure = Some(err);
                }
                join_set.abort_all();
            }
            Err(join_err) => {
                if failure.is_none() {
                    failure = Some(SanitizerError::CallFailed(join_err.to_string()));
                }
                join_set.abort_all();
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(sanitized),
    }
}

/// Replace each flagged span's tool message content with its sanitized
/// rewrite, preserving `tool_name`, `tool_call_id`, and position.
/// Non-flagged spans and every other message are carried verbatim.
fn rebuild_with_sanitized_spans(
    context: &StructuredContext,
    sanitized_spans: &HashMap<usize, String>,
) -> Vec<Message> {
    let replacement_by_message_index: HashMap<usize, &String> = context
        .untrusted_spans
        .iter()
        .filter_map(|span| {
            sanitized_spans
                .get(&span.index)
                .map(|content| (span.message_index, content))
        })
        .collect();

    context
        .all_messages
        .iter()
        .enumerate()
        .map(|(idx, message)| match replacement_by_message_index.get(&idx) {
            Some(sanitized_content) => Message::tool(
                message.tool_name.clone().unwrap_or_default(),
                (*sanitized_content).clone(),
                message.tool_call_id.clone(),
            ),
            None => message.clone(),
        })
        .collect()
}
