//! Text normalization shared by the lexical index, the embedder and queries.
//!
//! Both indexes must see the same token boundaries, so every body and every
//! query passes through [`normalize`] before it reaches either of them.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PUNCTUATION_RE: Regex = Regex::new(r"[^\w\s]").unwrap();
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = PUNCTUATION_RE.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokens of already-normalized text
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(' ').filter(|t| !t.is_empty())
}
