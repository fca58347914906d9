//! ```text
//! GuardConfig ─┬─► GuardConfigBuilder ─► Runtime GuardConfig
//!              │                          │
//!              │                          └─► Guard::guard ─┬─► StructuredContext  (context)
//!              │                                             ├─► AttributionResult (attribution)
//!              │                                             ├─► DetectionResult   (detection)
//!              │                                             └─► DefenseResult     (defense)
//!              │
//!              └─► ProxyProvider / ActionProvider / SanitizerProvider (providers, external)
//! ```
//!
//! # ipi-guard
//!
//! **A runtime guardrail against indirect prompt injection for tool-using
//! LLM agents.**
//!
//! Before a proposed tool call is dispatched, `ipi-guard` decides whether
//! it is genuinely driven by the end user's request or has been hijacked
//! by instructions smuggled into untrusted tool output. It does this by
//! leave-one-out attribution against a separate proxy scoring model: if
//! an untrusted span influences the action more than the user's own
//! request does (within a configurable margin), the guard sanitizes the
//! offending span, masks reasoning that may already be polluted, and asks
//! the agent to re-propose its action — never falling back to the
//! original, potentially attacker-controlled, call.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use ipi_guard::prelude::*;
//!
//! let config = GuardConfigBuilder::new()
//!     .with_file("ipi-guard.toml")?
//!     .with_env()
//!     .build()?;
//!
//! let guard = Guard::new(Arc::new(config), proxy, action_provider, sanitizer);
//! let result = guard.guard(&messages, proposed_action, &untrusted_tool_names).await?;
//! // result.final_action is what should actually be executed.
//! ```
//!
//! ## Modules
//!
//! - [`model`] – Immutable value types: `Message`, `ToolCall`, `UntrustedSpan`
//! - [`context`] – Decomposes a conversation into `(user_request, history, untrusted_spans)`
//! - [`providers`] – `ProxyProvider`/`ActionProvider`/`SanitizerProvider` capability traits
//! - [`attribution`] – Bounded-concurrency leave-one-out scoring
//! - [`detection`] – The dominance-shift detection rule
//! - [`defense`] – Sanitize / mask / regenerate, with the no-fallback guarantee
//! - [`guard`] – The orchestrator and its single `guard` entry point
//! - [`config`] – Layered configuration loading and validation
//! - [`error`] – The error type `guard()` itself can return
//! - `testing` (feature `testing`) – In-memory fake providers for tests

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod attribution;
pub mod config;
pub mod context;
pub mod defense;
pub mod detection;
pub mod error;
pub mod guard;
pub mod model;
pub mod providers;

#[cfg(feature = "testing")]
pub mod testing;

/// Re-exports for convenient access to core types.
pub mod prelude {
    pub use crate::attribution::{AttributionError, AttributionResult};
    pub use crate::config::{ConfigError, GuardConfig, GuardConfigBuilder, OnAttributionFailure};
    pub use crate::context::StructuredContext;
    pub use crate::defense::{DefenseError, DefenseResult};
    pub use crate::detection::DetectionResult;
    pub use crate::error::GuardError;
    pub use crate::guard::Guard;
    pub use crate::model::{Message, Role, ToolCall, UntrustedSpan};
    pub use crate::providers::{ActionProvider, ProxyProvider, SanitizerProvider};
}
