//! Policy validation.
//!
//! Validation runs once at the pipeline boundary, before any vault
//! access; everything downstream works with a known-good policy.

use std::collections::BTreeSet;

use super::error::PolicyError;
use super::AegisPolicy;

/// Validates a policy against the labels the registry can actually emit.
///
/// # Errors
///
/// Returns `PolicyError` if the confidence threshold is out of range,
/// the language tag is empty, or any requested entity label is unknown.
pub fn validate_policy(
    policy: &AegisPolicy,
    known_labels: &BTreeSet<String>,
) -> Result<(), PolicyError> {
    if !(0.0..=1.0).contains(&policy.confidence_score) {
        return Err(PolicyError::ConfidenceOutOfRange {
            value: policy.confidence_score,
        });
    }

    if policy.language.trim().is_empty() {
        return Err(PolicyError::EmptyLanguage);
    }

    for label in &policy.entity_types {
        if !known_labels.contains(label) {
            return Err(PolicyError::UnknownEntityType {
                label: label.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity;

    fn known() -> BTreeSet<String> {
        [entity::PERSON, entity::EMAIL_ADDRESS, entity::SECRET_KEY]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert!(validate_policy(&AegisPolicy::default(), &known()).is_ok());
    }

    #[test]
    fn test_confidence_out_of_range() {
        let mut policy = AegisPolicy::default();
        policy.confidence_score = 1.5;
        assert!(matches!(
            validate_policy(&policy, &known()),
            Err(PolicyError::ConfidenceOutOfRange { .. })
        ));

        policy.confidence_score = -0.1;
        assert!(validate_policy(&policy, &known()).is_err());
    }

    #[test]
    fn test_nan_confidence_rejected() {
        let mut policy = AegisPolicy::default();
        policy.confidence_score = f64::NAN;
        assert!(matches!(
            validate_policy(&policy, &known()),
            Err(PolicyError::ConfidenceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_unknown_entity_type() {
        let mut policy = AegisPolicy::default();
        policy.entity_types = vec!["NOT_A_THING".to_string()];
        assert!(matches!(
            validate_policy(&policy, &known()),
            Err(PolicyError::UnknownEntityType { label }) if label == "NOT_A_THING"
        ));
    }

    #[test]
    fn test_empty_language_rejected() {
        let mut policy = AegisPolicy::default();
        policy.language = "  ".to_string();
        assert!(matches!(
            validate_policy(&policy, &known()),
            Err(PolicyError::EmptyLanguage)
        ));
    }
}
