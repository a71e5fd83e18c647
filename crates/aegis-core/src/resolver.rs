//! Allow-list filtering and span resolution.
//!
//! The resolver turns the registry's raw span union into the
//! non-overlapping, ordered sequence the tokenizer consumes. Tie-breaks
//! are fully deterministic so that identical inputs always produce
//! identical token assignments.

use std::cmp::Ordering;
use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

use crate::entity;
use crate::error::PipelineError;
use crate::policy::AegisPolicy;
use crate::span::Span;

/// Normalizes a string for allow-list membership: NFC then case-folded.
pub(crate) fn allow_key(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}

/// Drops spans whose surface matches the policy's allow list.
///
/// The normalized set is built once per call; membership checks are then
/// constant-time.
pub(crate) fn filter_allow_list(spans: Vec<Span>, text: &str, policy: &AegisPolicy) -> Vec<Span> {
    if policy.allow_list.is_empty() {
        return spans;
    }
    let allowed: HashSet<String> = policy.allow_list.iter().map(|s| allow_key(s)).collect();
    spans
        .into_iter()
        .filter(|span| !allowed.contains(&allow_key(span.surface(text))))
        .collect()
}

/// Resolves raw spans into a non-overlapping sequence sorted by start.
///
/// Rules, in order: drop spans below the confidence threshold; for
/// overlapping spans keep the higher confidence, breaking ties by longer
/// span, then entity-type priority, then earlier start, then recognizer
/// id; sort the survivors ascending.
///
/// # Errors
///
/// Returns an invariant violation for zero-length, out-of-bounds, or
/// boundary-splitting spans; the pipeline fails closed rather than
/// guessing.
pub(crate) fn resolve(
    spans: Vec<Span>,
    text: &str,
    threshold: f64,
) -> Result<Vec<Span>, PipelineError> {
    for span in &spans {
        if !span.is_valid_for(text) {
            return Err(PipelineError::Invariant(format!(
                "span [{}, {}) from {} is invalid for input of {} bytes",
                span.start,
                span.end,
                span.recognizer_id,
                text.len()
            )));
        }
    }

    let mut candidates: Vec<Span> = spans
        .into_iter()
        .filter(|s| s.confidence >= threshold)
        .collect();
    candidates.sort_by(compare_strength);

    let mut kept: Vec<Span> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !kept.iter().any(|k| k.overlaps(&candidate)) {
            kept.push(candidate);
        }
    }

    kept.sort_by_key(|s| s.start);
    Ok(kept)
}

/// Strength ordering for overlap resolution: strongest first.
fn compare_strength(a: &Span, b: &Span) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.len().cmp(&a.len()))
        .then_with(|| {
            entity::priority_rank(&a.entity_type).cmp(&entity::priority_rank(&b.entity_type))
        })
        .then_with(|| a.entity_type.cmp(&b.entity_type))
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.recognizer_id.cmp(&b.recognizer_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize, label: &str, conf: f64, id: &str) -> Span {
        Span::new(start, end, label, conf, id)
    }

    #[test]
    fn test_threshold_drop() {
        let text = "abcdefghij";
        let spans = vec![
            span(0, 4, "PERSON", 0.5, "a"),
            span(5, 9, "PERSON", 0.9, "b"),
        ];
        let resolved = resolve(spans, text, 0.85).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].start, 5);
    }

    #[test]
    fn test_overlap_keeps_higher_confidence() {
        let text = "abcdefghij";
        let spans = vec![
            span(0, 6, "PERSON", 0.9, "a"),
            span(4, 8, "DATE_TIME", 0.95, "b"),
        ];
        let resolved = resolve(spans, text, 0.0).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].entity_type, "DATE_TIME");
    }

    #[test]
    fn test_confidence_tie_prefers_longer() {
        let text = "on 01/01/2025 x";
        let spans = vec![
            span(0, 13, "DATE_TIME", 0.85, "a"),
            span(3, 13, "DATE_TIME", 0.85, "b"),
        ];
        let resolved = resolve(spans, text, 0.0).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].start, 0);
    }

    #[test]
    fn test_full_tie_uses_type_priority() {
        let text = "123-45-6789";
        let spans = vec![
            span(0, 11, "PHONE_NUMBER", 0.85, "phone_pattern"),
            span(0, 11, "US_SSN", 0.85, "us_ssn_pattern"),
        ];
        let resolved = resolve(spans, text, 0.0).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].entity_type, "US_SSN");
    }

    #[test]
    fn test_unknown_types_tie_break_alphabetically() {
        let text = "LOT-123";
        let spans = vec![
            span(0, 7, "PROTOCOL_ID", 0.9, "protocol_pattern"),
            span(0, 7, "LOT_NUMBER", 0.9, "lot_pattern"),
        ];
        let resolved = resolve(spans, text, 0.0).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].entity_type, "LOT_NUMBER");
    }

    #[test]
    fn test_adjacent_spans_both_survive() {
        let text = "abcdefghij";
        let spans = vec![
            span(0, 5, "PERSON", 0.9, "a"),
            span(5, 10, "PERSON", 0.9, "b"),
        ];
        let resolved = resolve(spans, text, 0.0).unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved[0].start < resolved[1].start);
    }

    #[test]
    fn test_zero_length_span_is_invariant_violation() {
        let result = resolve(vec![span(3, 3, "PERSON", 0.9, "a")], "abcdef", 0.0);
        assert!(matches!(result, Err(PipelineError::Invariant(_))));
    }

    #[test]
    fn test_out_of_bounds_span_is_invariant_violation() {
        let result = resolve(vec![span(0, 99, "PERSON", 0.9, "a")], "abc", 0.0);
        assert!(matches!(result, Err(PipelineError::Invariant(_))));
    }

    #[test]
    fn test_allow_list_case_insensitive() {
        let text = "Give Tylenol to him";
        let mut policy = AegisPolicy::default();
        policy.allow_list = vec!["tylenol".to_string()];
        let spans = vec![span(5, 12, "PERSON", 0.9, "a")];
        assert!(filter_allow_list(spans, text, &policy).is_empty());
    }

    #[test]
    fn test_allow_list_nfc_normalization() {
        // Decomposed "é" (e + combining acute) matches the composed form.
        let text = "drug Zome\u{0301}x works";
        let mut policy = AegisPolicy::default();
        policy.allow_list = vec!["zom\u{00e9}x".to_string()];
        let spans = vec![span(5, 12, "PERSON", 0.9, "a")];
        assert!(filter_allow_list(spans, text, &policy).is_empty());
    }
}
