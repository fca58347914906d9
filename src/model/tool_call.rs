//! [`ToolCall`] — the proposed action a guarded agent wants to execute.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A proposed tool invocation.
///
/// `raw_text` is the verbatim textual form the agent emitted — it is what
/// the proxy scores. `arguments` is a parsed convenience only and is never
/// consulted by the attribution or detection logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Canonical tool name.
    pub name: String,
    /// Parsed arguments, for callers that want structured access.
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// The exact text the agent produced for this call.
    pub raw_text: String,
}

impl ToolCall {
    /// Build a tool call.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        arguments: Map<String, Value>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arguments,
            raw_text: raw_text.into(),
        }
    }

    /// Build a tool call whose `raw_text` is derived as `"<name>()"` and
    /// whose arguments are empty — the fail-safe shape constructed every
    /// time defense can't trust either the original action or a fresh
    /// regeneration.
    ///
    /// The no-argument textual form is load-bearing: a downstream consumer
    /// that parses `raw_text` strictly depends on exactly this shape.
    #[must_use]
    pub fn stripped(name: impl Into<String>) -> Self {
        let name = name.into();
        let raw_text = format!("{name}()");
        Self {
            name,
            arguments: Map::new(),
            raw_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripped_has_empty_args_and_fixed_shape() {
        let call = ToolCall::stripped("send_money");
        assert_eq!(call.name, "send_money");
        assert!(call.arguments.is_empty());
        assert_eq!(call.raw_text, "send_money()");
    }

    #[test]
    fn new_preserves_raw_text_verbatim() {
        let mut args = Map::new();
        args.insert("query".into(), Value::String("rust".into()));
        let call = ToolCall::new("web_search", args.clone(), "web_search(query=\"rust\")");
        assert_eq!(call.raw_text, "web_search(query=\"rust\")");
        assert_eq!(call.arguments, args);
    }
}
