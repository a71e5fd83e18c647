//! # aegis-core
//!
//! Bidirectional privacy filter for text crossing the boundary between a
//! trusted application and untrusted consumers (LLMs, logging sinks,
//! search indexes).
//!
//! Outbound, the sanitize pipeline detects sensitive entities, replaces
//! them with deterministic context-preserving tokens, and records the
//! mapping in an encrypted, TTL-bounded, session-scoped vault. Inbound,
//! the reveal pipeline substitutes the original values back, but only
//! for authorized callers, and never from a partial or uncertain state.
//!
//! ## Features
//!
//! - **Entity recognition**: a pluggable NER backend plus rule-based
//!   recognizers for standard PII and pharma/clinical identifiers
//! - **Deterministic tokenization**: stable, collision-free tokens per
//!   session across four redaction modes
//! - **The Vault**: AES-256-GCM encrypted, session-scoped mapping store
//!   with sliding TTL and LRU capacity bounds
//! - **Fail-closed gate**: any pipeline failure blocks traffic instead of
//!   leaking text
//!
//! ## Example
//!
//! ```rust,no_run
//! use aegis_core::Aegis;
//!
//! # fn main() -> Result<(), aegis_core::AegisError> {
//! let aegis = Aegis::builder().build()?;
//!
//! let outcome = aegis.sanitize("Patient John Doe has a rash.", "session-1", None)?;
//! assert_eq!(outcome.text, "Patient [PATIENT_A] has a rash.");
//!
//! let restored = aegis.desanitize(&outcome.text, "session-1", true)?;
//! assert_eq!(restored, "Patient John Doe has a rash.");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod adapter;
pub mod analyzer;
pub mod engine;
pub mod entity;
pub mod error;
pub mod policy;
pub mod recognizer;
mod resolver;
mod reveal;
pub mod span;
pub mod tokenizer;
pub mod vault;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::adapter::AsyncAegis;
    pub use crate::engine::{Aegis, AegisBuilder, Health, SanitizeOutcome};
    pub use crate::error::{AegisError, FailureKind};
    pub use crate::policy::{AegisPolicy, RedactionMode};
    pub use crate::span::Span;
    pub use crate::vault::{MappingHandle, RootKey, VaultConfig};
}

/// Re-export commonly used types at the crate root.
pub use adapter::AsyncAegis;
pub use analyzer::{EntityAnalyzer, LexiconAnalyzer};
pub use engine::{Aegis, AegisBuilder, Health, SanitizeOutcome};
pub use error::{AegisError, FailureKind};
pub use policy::{AegisPolicy, PolicyError, RedactionMode};
pub use recognizer::{PatternRecognizer, Recognizer, RecognizerRegistry};
pub use span::Span;
pub use vault::{MappingHandle, RootKey, Vault, VaultConfig, VaultError};
