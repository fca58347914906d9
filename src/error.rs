//! The error type returned by [`crate::guard::Guard::guard`].
//!
//! Every other error kind in this crate (`ContextError`, `AttributionError`,
//! `DefenseError`) is handled internally by the orchestrator's failure
//! policy and folded into a [`crate::defense::DefenseResult`] — it never
//! escapes as an `Err` from `guard()`. Only a structurally invalid
//! conversation fails the call outright, before any capability is invoked.

use thiserror::Error;

use crate::context::ContextError;

/// The only error variant `guard()` can return.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The caller-supplied messages violate a structural invariant.
    #[error(transparent)]
    InvalidInput(#[from] ContextError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_context_error() {
        let err: GuardError = ContextError::InvalidInput {
            reason: "tool message missing tool_name".into(),
        }
        .into();
        assert!(err.to_string().contains("tool_name"));
    }
}
