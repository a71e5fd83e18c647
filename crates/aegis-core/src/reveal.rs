//! Token detection and substitution for the reveal pipeline.
//!
//! Tokens are bracketed and therefore unambiguous: one regex pass finds
//! them all, and substring-shaped pairs like `[PATIENT_A]` /
//! `[PATIENT_AA]` never interfere because each match consumes the whole
//! bracketed token.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

/// The token grammar emitted by MASK and REPLACE modes.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[A-Z][A-Z0-9_]*\]").expect("token regex is valid"));

/// Whether `text` contains anything token-shaped.
pub(crate) fn contains_token(text: &str) -> bool {
    TOKEN_RE.is_match(text)
}

/// Number of token-shaped substrings in `text`.
pub(crate) fn count_tokens(text: &str) -> u64 {
    TOKEN_RE.find_iter(text).count() as u64
}

/// Substitutes known tokens from `forward` in a single pass. Unknown
/// tokens stay in place and increment `misses`.
pub(crate) fn substitute(
    text: &str,
    forward: &BTreeMap<String, String>,
    misses: &AtomicU64,
) -> String {
    TOKEN_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            match forward.get(token) {
                Some(surface) => surface.clone(),
                None => {
                    misses.fetch_add(1, Ordering::Relaxed);
                    trace!(token, "reveal miss; token left in place");
                    token.to_string()
                },
            }
        })
        .into_owned()
}
