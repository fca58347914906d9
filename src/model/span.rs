//! [`UntrustedSpan`] — a piece of conversation content attributed to an
//! untrusted tool.

use serde::{Deserialize, Serialize};

/// A contiguous piece of content originating from a tool whose name the
/// caller declared untrusted.
///
/// `index` is a dense 0-based position in the ordered list of untrusted
/// spans extracted from the conversation; `message_index` references the
/// originating [`Message`](crate::model::Message) by position in the
/// input list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedSpan {
    /// Dense 0-based position among all untrusted spans in this context.
    pub index: usize,
    /// The tool that produced this content.
    pub tool_name: String,
    /// The span's text.
    pub content: String,
    /// Position of the originating message in the input message list.
    pub message_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_roundtrip() {
        let span = UntrustedSpan {
            index: 2,
            tool_name: "web_search".into(),
            content: "AA123 $450".into(),
            message_index: 5,
        };
        let json = serde_json::to_string(&span).unwrap();
        let back: UntrustedSpan = serde_json::from_str(&json).unwrap();
        assert_eq!(span, back);
    }
}
