//! Canonical lookup keys.
//!
//! Every registry cache, the index store, and every lookup request joins on a
//! [`CanonicalKey`]. The same [`normalize`] runs when caches are populated and
//! when a user request is resolved, so `"3D Pin"`, `"3d-pin"`, and `"3d pin"`
//! all land on `3dPin`.
//!
//! Words are split on whitespace, `-`, `.`, `_`, and on lowercase→uppercase
//! transitions, lowercased, title-cased, and concatenated. A word that would
//! follow a chunk not ending in a lowercase letter is appended in lowercase so
//! the word boundaries of an emitted key can be recovered; this is what makes
//! `normalize(normalize(s)) == normalize(s)` hold.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Normalized identity used to join registry, cache, and index records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns a freeform display name into its canonical key.
///
/// Fails with [`HarvestError::InvalidInput`] when the input has no word
/// characters at all (empty, whitespace-only, or separators only).
pub fn normalize(display_name: &str) -> Result<CanonicalKey, HarvestError> {
    let words = split_words(display_name);
    if words.is_empty() {
        return Err(HarvestError::invalid("component name must not be empty"));
    }

    let mut key = String::with_capacity(display_name.len());
    for word in words {
        let lower = word.to_lowercase();
        let boundary_visible = key.chars().last().is_none_or(char::is_lowercase);
        if boundary_visible {
            push_title_case(&mut key, &lower);
        } else {
            key.push_str(&lower);
        }
    }

    Ok(CanonicalKey(key))
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | '.' | '_')
}

fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in input.chars() {
        if is_separator(c) {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        if c.is_uppercase() && prev.is_some_and(char::is_lowercase) && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
        prev = Some(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// Uppercases the first character only when it maps to a single character.
fn push_title_case(out: &mut String, lower: &str) {
    let mut chars = lower.chars();
    let Some(first) = chars.next() else {
        return;
    };
    let mut upper = first.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => out.push(u),
        _ => out.push(first),
    }
    out.push_str(chars.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> String {
        normalize(s).unwrap().as_str().to_string()
    }

    #[test]
    fn spelling_variants_share_a_key() {
        assert_eq!(key("3D Pin"), "3dPin");
        assert_eq!(key("3d-pin"), "3dPin");
        assert_eq!(key("3d pin"), "3dPin");
        assert_eq!(key("  3d   PIN "), "3dPin");
    }

    #[test]
    fn title_cases_each_word() {
        assert_eq!(key("animated beam"), "AnimatedBeam");
        assert_eq!(key("Animated-Beam"), "AnimatedBeam");
        assert_eq!(key("animated.beam"), "AnimatedBeam");
        assert_eq!(key("animated_beam"), "AnimatedBeam");
        assert_eq!(key("AnimatedBeam"), "AnimatedBeam");
    }

    #[test]
    fn empty_input_is_rejected() {
        for input in ["", "   ", "\t\n", "-.-_"] {
            let err = normalize(input).unwrap_err();
            assert!(matches!(err, HarvestError::InvalidInput(_)), "{input:?}");
        }
    }

    #[test]
    fn idempotent_over_awkward_inputs() {
        let samples = [
            "3D Pin",
            "3d-card effect",
            "web 3 card",
            "a b c",
            "card a",
            "card a b",
            "iPhone 15 Pro mockup",
            "HTML Parser",
            "HTMLParser",
            "Bento   Grid",
            "glowing-stars.card",
            "Text Generate Effect",
            "ßtraße gasse",
            "Über Menü",
            "x",
            "X",
            "tabs (v2)",
            "Apple Cards Carousel",
        ];
        for sample in samples {
            let once = normalize(sample).unwrap();
            let twice = normalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "normalization not idempotent for {sample:?}");
        }
    }

    #[test]
    fn keys_contain_no_separators() {
        for sample in ["a - b", "foo.bar baz", "one_two three-four", "\tlead trail\n"] {
            let k = key(sample);
            assert!(
                !k.chars().any(is_separator),
                "separator left in {k:?} from {sample:?}"
            );
        }
    }

    #[test]
    fn word_after_non_lowercase_chunk_is_folded() {
        assert_eq!(key("web 3 card"), "Web3card");
        assert_eq!(key("a b"), "Ab");
        assert_eq!(key("card a"), "CardA");
    }
}
