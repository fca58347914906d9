//! Immutable value types shared by every stage of the guard pipeline.
//!
//! Each type here is produced by exactly one stage of the pipeline and
//! handed downstream read-only: the context builder produces `Message`
//! sequences and `UntrustedSpan`s, the agent proposes a `ToolCall`. There
//! are no back-references or cycles between them.

mod message;
mod span;
mod tool_call;

pub use message::{Message, Role};
pub use span::UntrustedSpan;
pub use tool_call::ToolCall;
