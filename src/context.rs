//! Context builder — decomposes a conversation into a user request, a
//! trusted history, and an ordered set of untrusted spans, and produces the
//! ablated/masked variants the rest of the pipeline scores.

use std::collections::HashSet;

use thiserror::Error;

use crate::model::{Message, Role, ToolCall, UntrustedSpan};

/// Placeholder substituted for assistant reasoning that may have been
/// polluted by an untrusted span — fixed for reproducibility, shared by
/// the scoring-time mask ([`StructuredContext::with_cot_masked_after_first_untrusted_span`])
/// and the regeneration-time mask in [`crate::defense`].
pub const COT_MASK_PLACEHOLDER: &str = "[Reasoning redacted]";

/// Errors produced while decomposing a conversation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    /// A message violates a structural invariant of the data model.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Human-readable description of the violation.
        reason: String,
    },
}

/// The decomposed view of a conversation that the rest of the pipeline
/// consumes.
///
/// Every field is a plain value — there are no back-references into the
/// caller's message list, so this type is freely `Clone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredContext {
    /// The first `role = user` message, if any.
    pub user_request: Option<Message>,
    /// Every non-user, non-untrusted-tool message, in input order.
    pub history: Vec<Message>,
    /// Untrusted tool spans, in the order their messages appear.
    pub untrusted_spans: Vec<UntrustedSpan>,
    /// The verbatim input sequence.
    pub all_messages: Vec<Message>,
}

impl StructuredContext {
    /// Decompose `messages` given the caller's untrusted/privileged tool
    /// name sets.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidInput`] if any message violates the
    /// `tool_name` presence invariant. No capability is invoked before this
    /// check runs.
    pub fn build(
        messages: &[Message],
        untrusted_tool_names: &HashSet<String>,
        privileged_tool_names: &HashSet<String>,
    ) -> Result<Self, ContextError> {
        let mut user_request = None;
        let mut history = Vec::new();
        let mut untrusted_spans = Vec::new();

        for (message_index, message) in messages.iter().enumerate() {
            if !message.is_structurally_valid() {
                return Err(ContextError::InvalidInput {
                    reason: format!(
                        "message {message_index} has role {} but tool_name {}",
                        message.role,
                        if message.tool_name.is_some() {
                            "is set"
                        } else {
                            "is missing"
                        }
                    ),
                });
            }

            match message.role {
                Role::User => {
                    if user_request.is_none() {
                        user_request = Some(message.clone());
                    }
                    // Every user message (not just the first) is excluded
                    // from `history` — only the first becomes the request.
                }
                Role::Tool => {
                    // tool_name is guaranteed `Some` by the validity check above.
                    let tool_name = message.tool_name.clone().unwrap_or_default();
                    let is_untrusted = untrusted_tool_names.contains(&tool_name)
                        && !privileged_tool_names.contains(&tool_name);
                    if is_untrusted {
                        untrusted_spans.push(UntrustedSpan {
                            index: untrusted_spans.len(),
                            tool_name,
                            content: message.content.clone(),
                            message_index,
                        });
                    } else {
                        history.push(message.clone());
                    }
                }
                Role::System | Role::Assistant => history.push(message.clone()),
            }
        }

        Ok(Self {
            user_request,
            history,
            untrusted_spans,
            all_messages: messages.to_vec(),
        })
    }

    /// The message sequence with the first user message removed.
    #[must_use]
    pub fn with_user_ablated(&self) -> Vec<Message> {
        let mut seen_user = false;
        self.all_messages
            .iter()
            .filter(|m| {
                if m.role == Role::User && !seen_user {
                    seen_user = true;
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect()
    }

    /// The message sequence with the `i`-th untrusted span's tool message
    /// removed.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range for `untrusted_spans` — callers (the
    /// attribution engine) only ever invoke this for valid span indices it
    /// just enumerated.
    #[must_use]
    pub fn with_span_ablated(&self, i: usize) -> Vec<Message> {
        let target = self.untrusted_spans[i].message_index;
        self.all_messages
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != target)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// The earliest position (index into `all_messages`) among the
    /// untrusted spans, if any exist.
    #[must_use]
    pub fn earliest_untrusted_position(&self) -> Option<usize> {
        self.untrusted_spans.iter().map(|s| s.message_index).min()
    }

    /// The message sequence with every assistant message strictly after the
    /// earliest untrusted span replaced by [`COT_MASK_PLACEHOLDER`].
    ///
    /// Returns the sequence unchanged if there are no untrusted spans.
    #[must_use]
    pub fn with_cot_masked_after_first_untrusted_span(&self) -> Vec<Message> {
        mask_assistant_after(&self.all_messages, self.earliest_untrusted_position())
    }
}

/// Replace every assistant message positioned strictly after `threshold`
/// with [`COT_MASK_PLACEHOLDER`], preserving position and role.
///
/// Shared by scoring-time masking ([`StructuredContext`]) and
/// regeneration-time masking ([`crate::defense`]), which mask after the
/// earliest *flagged* span rather than the earliest untrusted span.
pub(crate) fn mask_assistant_after(messages: &[Message], threshold: Option<usize>) -> Vec<Message> {
    let Some(threshold) = threshold else {
        return messages.to_vec();
    };
    messages
        .iter()
        .enumerate()
        .map(|(idx, m)| {
            if m.role == Role::Assistant && idx > threshold {
                Message::assistant(COT_MASK_PLACEHOLDER)
            } else {
                m.clone()
            }
        })
        .collect()
}

/// Render a message sequence to the fixed textual form the proxy scores.
///
/// Each message becomes `"<ROLE>: <content>\n"` (role uppercased), in
/// order. This exact delimiter format is stable because the proxy's
/// per-token alignment depends on byte offsets into it.
#[must_use]
pub fn serialize_messages(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&message.role.to_string().to_uppercase());
        out.push_str(": ");
        out.push_str(&message.content);
        out.push('\n');
    }
    out
}

/// Render a message sequence plus a proposed action's `raw_text` to the
/// single string a human (or an audit log) would read as "the whole thing
/// the proxy saw" — the prompt and continuation concatenated. The
/// attribution engine sends the two halves to [`crate::providers::ProxyProvider::score`]
/// separately; this helper exists for logging and tests.
#[must_use]
pub fn serialize_with_action(messages: &[Message], action: &ToolCall) -> String {
    let mut out = serialize_messages(messages);
    out.push_str(&action.raw_text);
    out
}
