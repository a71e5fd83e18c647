//! Engine-level error types and the failure-gate contract.
//!
//! Internally the pipelines propagate [`PipelineError`], which keeps full
//! detail for logging. The failure gate translates everything except
//! caller-input errors into the single opaque
//! [`AegisError::SanitizationBlocked`] signal: callers learn that traffic
//! was blocked, never why.

use std::fmt;

use thiserror::Error;

use crate::policy::PolicyError;
use crate::recognizer::RecognizerError;
use crate::vault::VaultError;

/// Broad classification of a gated failure, used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A recognizer or the NER backend raised.
    Recognizer,
    /// Authenticated decryption or key handling failed.
    VaultCrypto,
    /// The sanitize wall-clock budget was exceeded.
    Timeout,
    /// A core invariant was broken (bijection, zero-length span).
    InvariantViolation,
    /// Anything else.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Recognizer => "recognizer",
            Self::VaultCrypto => "vault_crypto",
            Self::Timeout => "timeout",
            Self::InvariantViolation => "invariant_violation",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the public engine API.
#[derive(Debug, Error)]
pub enum AegisError {
    /// The supplied policy is invalid. Surfaced synchronously, before any
    /// vault access.
    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),

    /// The failure gate fired: some pipeline stage failed and traffic was
    /// blocked. Detail is logged, not surfaced.
    #[error("sanitization failed, traffic blocked")]
    SanitizationBlocked {
        /// Failure classification, for callers that record metrics.
        kind: FailureKind,
    },

    /// The vault could not decrypt a session during reveal. Tokens were
    /// left in place.
    #[error("reveal failed for session {session_id}")]
    RevealFailed {
        /// The affected session.
        session_id: String,
    },

    /// Engine construction failed (bad root key, invalid recognizer).
    #[error("engine setup failed: {reason}")]
    Setup {
        /// What went wrong.
        reason: String,
    },
}

/// Internal pipeline error, with full detail for the gate to log.
#[derive(Debug, Error)]
pub(crate) enum PipelineError {
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("sanitize budget exceeded after {stage}")]
    Timeout { stage: &'static str },
}

impl PipelineError {
    /// Classifies the error for the gate's external signal.
    pub(crate) fn kind(&self) -> FailureKind {
        match self {
            Self::Recognizer(_) => FailureKind::Recognizer,
            Self::Vault(VaultError::Crypto { .. } | VaultError::Quarantined { .. }) => {
                FailureKind::VaultCrypto
            },
            Self::Vault(VaultError::BijectionViolation { .. }) => FailureKind::InvariantViolation,
            Self::Vault(_) => FailureKind::Internal,
            Self::Invariant(_) => FailureKind::InvariantViolation,
            Self::Timeout { .. } => FailureKind::Timeout,
        }
    }
}
