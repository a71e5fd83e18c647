//! Recognizer registry: model-backed NER plus rule-based recognizers.
//!
//! The registry is built once at startup (the expensive part is the NER
//! backend) and shared immutably across all sessions. `analyze` returns
//! the raw union of every enabled recognizer's spans; deduplication and
//! overlap resolution happen downstream in the resolver.

mod patterns;

pub use patterns::PatternRecognizer;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::analyzer::EntityAnalyzer;
use crate::policy::AegisPolicy;
use crate::span::Span;

/// Errors raised during entity recognition.
#[derive(Debug, Error)]
pub enum RecognizerError {
    /// The NER backend failed.
    #[error("entity analyzer failure: {reason}")]
    Analyzer {
        /// Backend-reported reason.
        reason: String,
    },

    /// A rule-based recognizer failed.
    #[error("recognizer {recognizer_id} failure: {reason}")]
    Rule {
        /// The failing recognizer.
        recognizer_id: String,
        /// Failure reason.
        reason: String,
    },

    /// A custom recognizer was built from an invalid pattern.
    #[error("invalid pattern for {label}: {reason}")]
    InvalidPattern {
        /// The entity label the pattern was registered for.
        label: String,
        /// Compilation failure reason.
        reason: String,
    },
}

/// A rule-based entity recognizer.
pub trait Recognizer: Send + Sync {
    /// Stable identifier, used in span provenance and tie-breaks.
    fn id(&self) -> &str;

    /// Entity labels this recognizer can emit.
    fn entity_types(&self) -> &[String];

    /// Detects entities in `text`.
    ///
    /// # Errors
    ///
    /// Returns `RecognizerError` on failure; the pipeline fails closed.
    fn detect(&self, text: &str, language: &str) -> Result<Vec<Span>, RecognizerError>;
}

/// Ordered collection of recognizers plus the NER backend.
pub struct RecognizerRegistry {
    analyzer: Arc<dyn EntityAnalyzer>,
    recognizers: Vec<Box<dyn Recognizer>>,
}

impl RecognizerRegistry {
    /// Creates a registry with only the NER backend.
    #[must_use]
    pub fn new(analyzer: Arc<dyn EntityAnalyzer>) -> Self {
        Self {
            analyzer,
            recognizers: Vec::new(),
        }
    }

    /// Creates a registry with the NER backend plus the full built-in
    /// recognizer set (standard PII and the domain recognizers, with the
    /// default `MRN` prefix).
    #[must_use]
    pub fn builtin(analyzer: Arc<dyn EntityAnalyzer>) -> Self {
        let mut registry = Self::new(analyzer);
        for recognizer in patterns::builtin_recognizers() {
            registry.register(recognizer);
        }
        registry
    }

    /// Registers an additional recognizer.
    ///
    /// Registration happens at build time only; the registry is immutable
    /// once the engine is constructed.
    pub fn register(&mut self, recognizer: Box<dyn Recognizer>) {
        self.recognizers.push(recognizer);
    }

    /// The model identifier of the NER backend.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.analyzer.model_name()
    }

    /// Every entity label the registry can emit.
    #[must_use]
    pub fn known_labels(&self) -> BTreeSet<String> {
        let mut labels: BTreeSet<String> = self.analyzer.entity_types().iter().cloned().collect();
        for recognizer in &self.recognizers {
            labels.extend(recognizer.entity_types().iter().cloned());
        }
        labels
    }

    /// Runs every enabled recognizer and returns the raw span union.
    ///
    /// Recognizers whose labels do not intersect `policy.entity_types`
    /// are skipped (an empty set enables everything). No deduplication
    /// happens here.
    ///
    /// # Errors
    ///
    /// Propagates the first recognizer failure unchanged.
    pub fn analyze(&self, text: &str, policy: &AegisPolicy) -> Result<Vec<Span>, RecognizerError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let wanted: Option<HashSet<&str>> = if policy.entity_types.is_empty() {
            None
        } else {
            Some(policy.entity_types.iter().map(String::as_str).collect())
        };
        let enabled = |labels: &[String]| match &wanted {
            None => true,
            Some(set) => labels.iter().any(|l| set.contains(l.as_str())),
        };
        let span_enabled = |span: &Span| match &wanted {
            None => true,
            Some(set) => set.contains(span.entity_type.as_str()),
        };

        let mut spans = Vec::new();

        if enabled(self.analyzer.entity_types()) {
            let found = self.analyzer.analyze(text, &policy.language)?;
            debug!(model = self.analyzer.model_name(), count = found.len(), "ner pass complete");
            spans.extend(found.into_iter().filter(&span_enabled));
        }

        for recognizer in &self.recognizers {
            if !enabled(recognizer.entity_types()) {
                continue;
            }
            let found = recognizer.detect(text, &policy.language)?;
            spans.extend(found.into_iter().filter(&span_enabled));
        }

        Ok(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::LexiconAnalyzer;
    use crate::entity;

    fn registry() -> RecognizerRegistry {
        RecognizerRegistry::builtin(Arc::new(LexiconAnalyzer::new()))
    }

    #[test]
    fn test_known_labels_cover_builtins() {
        let labels = registry().known_labels();
        for label in [
            entity::PERSON,
            entity::EMAIL_ADDRESS,
            entity::PHONE_NUMBER,
            entity::IP_ADDRESS,
            entity::DATE_TIME,
            entity::URL,
            entity::CREDIT_CARD,
            entity::US_SSN,
            entity::MRN,
            entity::PROTOCOL_ID,
            entity::LOT_NUMBER,
            entity::GENE_SEQUENCE,
            entity::CHEMICAL_CAS,
            entity::SECRET_KEY,
        ] {
            assert!(labels.contains(label), "missing {label}");
        }
    }

    #[test]
    fn test_union_no_dedup() {
        let text = "mail john.doe@example.com";
        let spans = registry().analyze(text, &AegisPolicy::default()).unwrap();
        assert!(spans.iter().any(|s| s.entity_type == entity::EMAIL_ADDRESS));
    }

    #[test]
    fn test_entity_type_filter() {
        let mut policy = AegisPolicy::default();
        policy.entity_types = vec![entity::EMAIL_ADDRESS.to_string()];

        let text = "John Doe, john@example.com, 10.1.2.3";
        let spans = registry().analyze(text, &policy).unwrap();
        assert!(!spans.is_empty());
        assert!(spans.iter().all(|s| s.entity_type == entity::EMAIL_ADDRESS));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let spans = registry().analyze("", &AegisPolicy::default()).unwrap();
        assert!(spans.is_empty());
    }
}
