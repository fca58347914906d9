//! Orchestrator — the single `guard` entry point.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::attribution::{self, AttributionError};
use crate::config::{GuardConfig, OnAttributionFailure};
use crate::context::StructuredContext;
use crate::defense::{self, DefenseResult};
use crate::detection::{self, DetectionResult};
use crate::error::GuardError;
use crate::model::{Message, ToolCall};
use crate::providers::{ActionProvider, ProxyProvider, SanitizerProvider};

/// The guard: holds the three capability providers and the config that
/// governs how they're used, and exposes the single [`Guard::guard`] entry
/// point.
#[derive(Clone)]
pub struct Guard {
    config: Arc<GuardConfig>,
    proxy: Arc<dyn ProxyProvider>,
    action_provider: Arc<dyn ActionProvider>,
    sanitizer: Arc<dyn SanitizerProvider>,
}

impl Guard {
    /// Construct a guard from its configuration and three capability
    /// providers.
    #[must_use]
    pub fn new(
        config: Arc<GuardConfig>,
        proxy: Arc<dyn ProxyProvider>,
        action_provider: Arc<dyn ActionProvider>,
        sanitizer: Arc<dyn SanitizerProvider>,
    ) -> Self {
        Self {
            config,
            proxy,
            action_provider,
            sanitizer,
        }
    }

    /// Decide whether `action` is genuinely driven by the user's request or
    /// has been hijacked by an indirect prompt injection in `messages`, and
    /// return the action that should actually be executed.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidInput`] if `messages` violates a
    /// structural invariant — this is the only failure mode that escapes
    /// `guard()` itself; every other failure is folded into the returned
    /// [`DefenseResult`] per the configured failure policy.
    pub async fn guard(
        &self,
        messages: &[Message],
        action: ToolCall,
        untrusted_tool_names: &HashSet<String>,
    ) -> Result<DefenseResult, GuardError> {
        if self.config.privileged_tools.contains(&action.name) {
            debug!(tool = %action.name, "privileged tool, bypassing pipeline");
            return Ok(passthrough(action));
        }

        let context = StructuredContext::build(
            messages,
            untrusted_tool_names,
            &self.config.privileged_tools,
        )?;

        if context.user_request.is_none() || context.untrusted_spans.is_empty() {
            debug!(
                has_user_request = context.user_request.is_some(),
                span_count = context.untrusted_spans.len(),
                "nothing to attribute, passing through"
            );
            return Ok(passthrough(action));
        }

        let scoring_messages = if self.config.mask_cot_for_scoring {
            context.with_cot_masked_after_first_untrusted_span()
        } else {
            context.all_messages.clone()
        };
        let scoring_context = StructuredContext::build(
            &scoring_messages,
            untrusted_tool_names,
            &self.config.privileged_tools,
        )?;

        let attribution_result = attribution::attribute(
            &scoring_context,
            &action,
            &self.proxy,
            self.config.max_loo_batch_size,
            None,
        )
        .await;

        let attribution = match attribution_result {
            Ok(result) => result,
            Err(err) => return Ok(self.apply_attribution_failure_policy(action, err)),
        };

        let verdict = detection::detect(&attribution, self.config.margin_tau);

        if !verdict.detected {
            debug!("no dominance shift detected, passing through");
            return Ok(DefenseResult {
                original_action: action.clone(),
                final_action: action,
                was_defended: false,
                detection: verdict,
                attribution: Some(attribution),
                sanitized_spans: std::collections::HashMap::new(),
            });
        }

        info!(
            flagged = verdict.flagged_span_indices.len(),
            dominant_delta = verdict.dominant_delta,
            "dominance shift detected, running defense pipeline"
        );

        Ok(defense::defend(
            &context,
            &action,
            verdict,
            Some(attribution),
            self.config.enable_sanitization,
            self.config.enable_cot_masking,
            &self.sanitizer,
            &self.action_provider,
        )
        .await)
    }

    fn apply_attribution_failure_policy(
        &self,
        action: ToolCall,
        err: AttributionError,
    ) -> DefenseResult {
        tracing::warn!(error = %err, policy = ?self.config.on_attribution_failure, "attribution failed");
        match self.config.on_attribution_failure {
            OnAttributionFailure::Passthrough => passthrough(action),
            OnAttributionFailure::Block => {
                let stripped = ToolCall::stripped(action.name.clone());
                DefenseResult {
                    original_action: action,
                    final_action: stripped,
                    was_defended: true,
                    detection: DetectionResult {
                        detected: false,
                        flagged_span_indices: Vec::new(),
                        dominant_delta: 0.0,
                        user_delta: 0.0,
                    },
                    attribution: None,
                    sanitized_spans: std::collections::HashMap::new(),
                }
            }
        }
    }
}

fn passthrough(action: ToolCall) -> DefenseResult {
    DefenseResult {
        original_action: action.clone(),
        final_action: action,
        was_defended: false,
        detection: DetectionResult {
            detected: false,
            flagged_span_indices: Vec::new(),
            dominant_delta: 0.0,
            user_delta: 0.0,
        },
        attribution: None,
        sanitized_spans: std::collections::HashMap::new(),
    }
}
