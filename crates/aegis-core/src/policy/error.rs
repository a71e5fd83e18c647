//! Policy validation error types.

use thiserror::Error;

/// Errors produced while validating an [`super::AegisPolicy`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// The confidence threshold is outside `[0.0, 1.0]` (or NaN).
    #[error("confidence_score {value} is outside [0.0, 1.0]")]
    ConfidenceOutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// An entity label is not known to the recognizer registry.
    #[error("unknown entity type: {label}")]
    UnknownEntityType {
        /// The rejected label.
        label: String,
    },

    /// The language tag is empty.
    #[error("language tag must not be empty")]
    EmptyLanguage,
}
