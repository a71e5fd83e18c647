//! Deterministic tokenization.
//!
//! The tokenizer is the only component allowed to mutate a session's
//! mapping, and it always runs inside a single vault commit under the
//! session's exclusive lock. Within a session, equal
//! (entity type, normalized surface) pairs always produce the same token;
//! ordinals are handed out in first-seen order per token-prefix namespace.

mod synthetic;

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::entity;
use crate::policy::RedactionMode;
use crate::span::Span;
use crate::vault::{SessionMap, VaultError};

/// Length of the rendered HASH-mode digest prefix.
const HASH_PREFIX_LEN: usize = 16;

/// Normalizes a surface for mapping lookups: NFC, trailing whitespace
/// trimmed. The raw surface is what gets stored for exact re-insertion.
pub fn normalize_surface(surface: &str) -> String {
    let normalized: String = surface.nfc().collect();
    normalized.trim_end().to_string()
}

/// Renders a 0-based ordinal as a bijective base-26 suffix:
/// `0 -> A`, `25 -> Z`, `26 -> AA`.
#[must_use]
pub fn ordinal_suffix(mut ordinal: u64) -> String {
    let mut letters = Vec::new();
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let remainder = (ordinal % 26) as u8;
        letters.push(b'A' + remainder);
        ordinal /= 26;
        if ordinal == 0 {
            break;
        }
        ordinal -= 1;
    }
    letters.reverse();
    letters.into_iter().map(char::from).collect()
}

/// Computes the replacement string for one resolved span, reusing or
/// minting tokens against the session map as the mode requires.
pub(crate) fn replacement_for(
    map: &mut SessionMap,
    session_id: &str,
    mode: RedactionMode,
    span: &Span,
    raw_surface: &str,
) -> Result<String, VaultError> {
    let prefix = entity::token_prefix(&span.entity_type);
    let normalized = normalize_surface(raw_surface);

    match mode {
        RedactionMode::Mask => {
            let token = format!("[{prefix}]");
            map.record_forward_first_seen(&token, raw_surface);
            Ok(token)
        },
        RedactionMode::Replace => {
            if let Some(existing) = map.token_for(prefix, &normalized) {
                return Ok(existing.to_string());
            }
            let suffix = ordinal_suffix(map.next_ordinal(prefix));
            let token = format!("[{prefix}_{suffix}]");
            map.record(session_id, &token, raw_surface, prefix, &normalized)?;
            Ok(token)
        },
        RedactionMode::Synthetic => {
            if let Some(existing) = map.token_for(prefix, &normalized) {
                return Ok(existing.to_string());
            }
            let surrogate = synthetic::surrogate(session_id, &span.entity_type, &normalized);
            map.record(session_id, &surrogate, raw_surface, prefix, &normalized)?;
            Ok(surrogate)
        },
        RedactionMode::Hash => {
            let digest = Sha256::digest(normalized.as_bytes());
            let mut rendered = String::with_capacity(HASH_PREFIX_LEN);
            for byte in &digest[..HASH_PREFIX_LEN / 2] {
                use std::fmt::Write;
                let _ = write!(rendered, "{byte:02x}");
            }
            Ok(rendered)
        },
    }
}

/// Rewrites `text` by substituting each resolved span in one
/// left-to-right pass. Spans must be non-overlapping and sorted by start.
pub(crate) fn rewrite(
    map: &mut SessionMap,
    session_id: &str,
    mode: RedactionMode,
    text: &str,
    resolved: &[Span],
) -> Result<String, VaultError> {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;

    for span in resolved {
        let raw_surface = span.surface(text);
        let replacement = replacement_for(map, session_id, mode, span, raw_surface)?;
        output.push_str(&text[cursor..span.start]);
        output.push_str(&replacement);
        cursor = span.end;
    }
    output.push_str(&text[cursor..]);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize, label: &str) -> Span {
        Span::new(start, end, label, 0.9, "test")
    }

    #[test]
    fn test_ordinal_suffix_encoding() {
        assert_eq!(ordinal_suffix(0), "A");
        assert_eq!(ordinal_suffix(1), "B");
        assert_eq!(ordinal_suffix(25), "Z");
        assert_eq!(ordinal_suffix(26), "AA");
        assert_eq!(ordinal_suffix(27), "AB");
        assert_eq!(ordinal_suffix(51), "AZ");
        assert_eq!(ordinal_suffix(52), "BA");
        assert_eq!(ordinal_suffix(701), "ZZ");
        assert_eq!(ordinal_suffix(702), "AAA");
    }

    #[test]
    fn test_normalize_surface() {
        assert_eq!(normalize_surface("John Doe  "), "John Doe");
        // Decomposed e + combining acute composes to é.
        assert_eq!(normalize_surface("Jose\u{0301}"), "Jos\u{00e9}");
        // Leading whitespace is preserved.
        assert_eq!(normalize_surface(" x "), " x");
    }

    #[test]
    fn test_replace_mints_per_prefix_ordinals() {
        let mut map = SessionMap::default();
        let text = "John Doe 12/01/1980 Jane Roe";

        let t1 = rewrite(&mut map, "s1", RedactionMode::Replace, text, &[
            span(0, 8, "PERSON"),
            span(9, 19, "DATE_TIME"),
            span(20, 28, "PERSON"),
        ])
        .unwrap();

        // Ordinals count per prefix namespace, not globally.
        assert_eq!(t1, "[PATIENT_A] [DATE_A] [PATIENT_B]");
    }

    #[test]
    fn test_replace_reuses_existing_token() {
        let mut map = SessionMap::default();

        let first = rewrite(
            &mut map,
            "s1",
            RedactionMode::Replace,
            "John Doe",
            &[span(0, 8, "PERSON")],
        )
        .unwrap();
        let second = rewrite(
            &mut map,
            "s1",
            RedactionMode::Replace,
            "John Doe returned.",
            &[span(0, 8, "PERSON")],
        )
        .unwrap();

        assert_eq!(first, "[PATIENT_A]");
        assert_eq!(second, "[PATIENT_A] returned.");
    }

    #[test]
    fn test_mask_is_type_only() {
        let mut map = SessionMap::default();
        let text = "John Doe met Jane Roe";

        let masked = rewrite(&mut map, "s1", RedactionMode::Mask, text, &[
            span(0, 8, "PERSON"),
            span(13, 21, "PERSON"),
        ])
        .unwrap();

        assert_eq!(masked, "[PATIENT] met [PATIENT]");
        // Forward direction keeps the first surface seen.
        assert_eq!(map.surface_for("[PATIENT]"), Some("John Doe"));
    }

    #[test]
    fn test_hash_mode_writes_nothing() {
        let mut map = SessionMap::default();
        let hashed = rewrite(
            &mut map,
            "s1",
            RedactionMode::Hash,
            "John Doe",
            &[span(0, 8, "PERSON")],
        )
        .unwrap();

        assert_eq!(hashed.len(), HASH_PREFIX_LEN);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(map.forward_map().is_empty());

        // Deterministic across calls.
        let again = rewrite(
            &mut map,
            "s1",
            RedactionMode::Hash,
            "John Doe",
            &[span(0, 8, "PERSON")],
        )
        .unwrap();
        assert_eq!(hashed, again);
    }

    #[test]
    fn test_synthetic_is_deterministic_per_session() {
        let mut map = SessionMap::default();
        let a = rewrite(
            &mut map,
            "s1",
            RedactionMode::Synthetic,
            "John Doe",
            &[span(0, 8, "PERSON")],
        )
        .unwrap();
        let b = rewrite(
            &mut map,
            "s1",
            RedactionMode::Synthetic,
            "John Doe",
            &[span(0, 8, "PERSON")],
        )
        .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, "John Doe");

        // A different session seeds differently.
        let mut other = SessionMap::default();
        let c = rewrite(
            &mut other,
            "s2",
            RedactionMode::Synthetic,
            "John Doe",
            &[span(0, 8, "PERSON")],
        )
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_rewrite_interleaves_slices() {
        let mut map = SessionMap::default();
        let text = "a John Doe b 1.2.3.4 c";

        let out = rewrite(&mut map, "s1", RedactionMode::Replace, text, &[
            span(2, 10, "PERSON"),
            span(13, 20, "IP_ADDRESS"),
        ])
        .unwrap();

        assert_eq!(out, "a [PATIENT_A] b [IP_A] c");
    }

    #[test]
    fn test_consistency_across_modes() {
        // Same (entity type, normalized surface) must map to the same
        // token on repeated calls, whatever the mode.
        for mode in [
            RedactionMode::Mask,
            RedactionMode::Replace,
            RedactionMode::Synthetic,
            RedactionMode::Hash,
        ] {
            let mut map = SessionMap::default();
            let first = rewrite(&mut map, "s1", mode, "John Doe", &[span(0, 8, "PERSON")]).unwrap();
            let second =
                rewrite(&mut map, "s1", mode, "John Doe", &[span(0, 8, "PERSON")]).unwrap();
            assert_eq!(first, second, "mode {mode:?} is not stable");
        }
    }
}
