//! [`Message`] and [`Role`] — the atomic unit of conversation history.

use serde::{Deserialize, Serialize};

/// The role a [`Message`] was authored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A system prompt or instruction.
    System,
    /// The end user's own input.
    User,
    /// Agent-generated text, including chain-of-thought reasoning.
    Assistant,
    /// The result of a tool invocation.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation.
///
/// `tool_name` is present iff `role == Role::Tool`; `content` is always
/// present (possibly empty). Construction goes through the role-specific
/// helpers below so that invariant cannot be violated from inside this
/// crate — [`crate::context::build`] still validates caller-supplied
/// messages defensively, since they may have been deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored this message.
    pub role: Role,
    /// Textual content.
    pub content: String,
    /// Canonical tool name, present only for `role == Tool`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Correlates a tool result back to the call that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Build a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    /// Build a tool-result message.
    #[must_use]
    pub fn tool(
        tool_name: impl Into<String>,
        content: impl Into<String>,
        tool_call_id: Option<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            tool_call_id,
        }
    }

    /// Whether this message satisfies the `tool_name` presence invariant.
    #[must_use]
    pub(crate) fn is_structurally_valid(&self) -> bool {
        match self.role {
            Role::Tool => self.tool_name.is_some(),
            _ => self.tool_name.is_none(),
        }
    }
}
