//! The NER capability consumed by the recognizer registry.
//!
//! The heavy model is external to this crate: the pipeline only needs one
//! operation, `analyze`, behind an [`EntityAnalyzer`] trait object that is
//! constructed once at startup and shared by reference count. The default
//! backend is [`LexiconAnalyzer`], a deterministic lexicon-driven person
//! detector suitable for embedding and tests; production deployments plug
//! a model-backed implementation through the same trait.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::entity;
use crate::recognizer::RecognizerError;
use crate::span::Span;

/// A named-entity recognition backend.
///
/// Implementations must be cheap to call concurrently; the registry never
/// mutates the analyzer after construction.
pub trait EntityAnalyzer: Send + Sync {
    /// The model identifier reported by health checks.
    fn model_name(&self) -> &str;

    /// Entity labels this backend can emit.
    fn entity_types(&self) -> &[String];

    /// Detects entities in `text`.
    ///
    /// # Errors
    ///
    /// Returns `RecognizerError` if the backend fails; the sanitize
    /// pipeline treats any such failure as fatal (fail closed).
    fn analyze(&self, text: &str, language: &str) -> Result<Vec<Span>, RecognizerError>;
}

/// Common English given names, lowercase.
///
/// Small on purpose: the lexicon backend trades recall for zero model
/// weight and full determinism.
static GIVEN_NAMES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "aaron", "adam", "alan", "albert", "alice", "amanda", "amy", "andrea", "andrew", "angela",
        "ann", "anna", "anthony", "arthur", "barbara", "benjamin", "betty", "beverly", "bob",
        "bobby", "brandon", "brenda", "brian", "bruce", "carl", "carol", "carolyn", "catherine",
        "charles", "charlotte", "cheryl", "chris", "christina", "christine", "christopher",
        "cynthia", "daniel", "david", "deborah", "debra", "dennis", "diana", "diane", "donald",
        "donna", "dorothy", "douglas", "edward", "elizabeth", "emily", "emma", "eric", "eugene",
        "evelyn", "frances", "frank", "gary", "george", "gerald", "gloria", "grace", "gregory",
        "hannah", "harold", "harry", "heather", "helen", "henry", "howard", "jack", "jacob",
        "james", "jane", "janet", "janice", "jason", "jean", "jeffrey", "jennifer", "jeremy",
        "jerry", "jessica", "joan", "joe", "john", "johnny", "jonathan", "jose", "joseph",
        "joshua", "joyce", "juan", "judith", "judy", "julia", "julie", "justin", "karen",
        "katherine", "kathleen", "kathryn", "keith", "kelly", "kenneth", "kevin", "kimberly",
        "larry", "laura", "lawrence", "linda", "lisa", "lois", "louis", "margaret", "maria",
        "marie", "marilyn", "mark", "martha", "mary", "matthew", "megan", "melissa", "michael",
        "michelle", "mildred", "nancy", "nathan", "nicholas", "nicole", "noah", "olivia",
        "pamela", "patricia", "patrick", "paul", "peter", "philip", "phyllis", "rachel", "ralph",
        "randy", "raymond", "rebecca", "richard", "robert", "roger", "ronald", "rose", "roy",
        "russell", "ruth", "ryan", "samantha", "samuel", "sandra", "sara", "sarah", "scott",
        "sean", "sharon", "shirley", "sophia", "stephanie", "stephen", "steven", "susan",
        "teresa", "terry", "theresa", "thomas", "timothy", "todd", "victoria", "vincent",
        "virginia", "walter", "wayne", "william", "willie",
    ]
    .into_iter()
    .collect()
});

/// Maximum number of words a detected name may cover.
const MAX_NAME_WORDS: usize = 3;

/// Confidence emitted for lexicon hits.
const LEXICON_CONFIDENCE: f64 = 0.85;

/// Deterministic, lexicon-driven PERSON detector.
///
/// A name starts at a capitalized word whose lowercase form is in the
/// given-name lexicon and extends over immediately following capitalized
/// words (surnames), up to three words total.
pub struct LexiconAnalyzer {
    model_name: String,
    labels: [String; 1],
}

impl LexiconAnalyzer {
    /// Creates the analyzer with the default model identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::with_name("lexicon-en-v1")
    }

    /// Creates the analyzer reporting `model_name` from health checks.
    #[must_use]
    pub fn with_name(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            labels: [entity::PERSON.to_string()],
        }
    }
}

impl Default for LexiconAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityAnalyzer for LexiconAnalyzer {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn entity_types(&self) -> &[String] {
        &self.labels
    }

    fn analyze(&self, text: &str, language: &str) -> Result<Vec<Span>, RecognizerError> {
        if !language.starts_with("en") {
            return Ok(Vec::new());
        }

        let words = split_words(text);
        let mut spans = Vec::new();
        let mut i = 0;

        while i < words.len() {
            let (start, end, word) = words[i];
            if !is_name_shaped(word) || !GIVEN_NAMES.contains(word.to_lowercase().as_str()) {
                i += 1;
                continue;
            }

            // Extend over adjacent capitalized words (surnames).
            let mut span_end = end;
            let mut j = i + 1;
            while j < words.len() && j - i < MAX_NAME_WORDS {
                let (next_start, next_end, next_word) = words[j];
                if next_start != span_end + 1
                    || !text[span_end..next_start].chars().all(char::is_whitespace)
                    || !is_name_shaped(next_word)
                {
                    break;
                }
                span_end = next_end;
                j += 1;
            }

            spans.push(Span::new(
                start,
                span_end,
                entity::PERSON,
                LEXICON_CONFIDENCE,
                "lexicon_ner",
            ));
            i = j;
        }

        Ok(spans)
    }
}

/// Splits `text` into alphabetic words with their byte ranges.
fn split_words(text: &str) -> Vec<(usize, usize, &str)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        let is_word = ch.is_alphabetic() || (start.is_some() && (ch == '\'' || ch == '-'));
        match (start, is_word) {
            (None, true) => start = Some(idx),
            (Some(s), false) => {
                words.push((s, idx, &text[s..idx]));
                start = None;
            },
            _ => {},
        }
    }
    if let Some(s) = start {
        words.push((s, text.len(), &text[s..]));
    }
    words
}

/// Whether `word` looks like a name component: leading uppercase letter,
/// lowercase (or `'`/`-`) remainder.
fn is_name_shaped(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_uppercase() && chars.all(|c| c.is_lowercase() || c == '\'' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> Vec<(String, String)> {
        let analyzer = LexiconAnalyzer::new();
        analyzer
            .analyze(text, "en")
            .unwrap()
            .into_iter()
            .map(|s| (s.surface(text).to_string(), s.entity_type))
            .collect()
    }

    #[test]
    fn test_detects_full_name() {
        let found = detect("Patient John Doe has a rash.");
        assert_eq!(found, vec![("John Doe".to_string(), "PERSON".to_string())]);
    }

    #[test]
    fn test_detects_multiple_names() {
        let found = detect("Jane Smith met John Doe.");
        assert_eq!(
            found,
            vec![
                ("Jane Smith".to_string(), "PERSON".to_string()),
                ("John Doe".to_string(), "PERSON".to_string()),
            ]
        );
    }

    #[test]
    fn test_lone_given_name() {
        let found = detect("John went home.");
        assert_eq!(found, vec![("John".to_string(), "PERSON".to_string())]);
    }

    #[test]
    fn test_ignores_uncapitalized_and_unknown() {
        assert!(detect("the john doe protocol").is_empty());
        assert!(detect("Zyxwvut Qponml").is_empty());
    }

    #[test]
    fn test_name_length_cap() {
        let found = detect("John Jacob Jingleheimer Schmidt");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "John Jacob Jingleheimer");
    }

    #[test]
    fn test_non_english_language_is_empty() {
        let analyzer = LexiconAnalyzer::new();
        assert!(analyzer.analyze("John Doe", "de").unwrap().is_empty());
    }
}
