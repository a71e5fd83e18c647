//! Redaction policy configuration.
//!
//! An [`AegisPolicy`] is the immutable per-call configuration for the
//! sanitize pipeline. Partial policies deserialize with defaults filled
//! in; unknown fields are rejected at the serde boundary so that a typo
//! never silently weakens a policy.

mod error;
mod validator;

pub use error::PolicyError;
pub use validator::validate_policy;

use serde::{Deserialize, Serialize};

/// Default confidence threshold below which spans are dropped.
pub const DEFAULT_CONFIDENCE_SCORE: f64 = 0.85;

/// Default language tag.
pub const DEFAULT_LANGUAGE: &str = "en";

/// How detected entities are rewritten in the output text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedactionMode {
    /// Generic type-only placeholder, e.g. `[PATIENT]`. Not reversible
    /// beyond the first surface seen per type.
    Mask,

    /// Type plus per-session ordinal, e.g. `[PATIENT_A]`. Fully
    /// reversible within the session.
    Replace,

    /// Plausible surrogate of the same entity type, deterministic within
    /// a session. One-way.
    Synthetic,

    /// 16-hex-char SHA-256 prefix of the surface. One-way; nothing is
    /// stored.
    Hash,
}

/// Immutable configuration for one sanitize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AegisPolicy {
    /// Terms never to redact, matched case-insensitively after NFC
    /// normalization.
    pub allow_list: Vec<String>,

    /// Entity labels to consider. Empty means "all known".
    pub entity_types: Vec<String>,

    /// Redaction mode.
    pub mode: RedactionMode,

    /// Confidence threshold in `[0.0, 1.0]`; spans scoring below are
    /// dropped.
    pub confidence_score: f64,

    /// Locale tag passed through to recognizers.
    pub language: String,
}

impl Default for AegisPolicy {
    fn default() -> Self {
        Self {
            allow_list: Vec::new(),
            entity_types: Vec::new(),
            mode: RedactionMode::Replace,
            confidence_score: DEFAULT_CONFIDENCE_SCORE,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}
