//! Term extraction for index entries

use std::collections::BTreeMap;

use regex::Regex;

// Runs of letters (any script) and digits; punctuation and symbols split terms
const TERM_PATTERN: &str = r"[\p{Alphabetic}\p{N}]+";

/// Tokenize note text into a term -> position-list map.
///
/// Terms are lowercased runs of letters and digits in any script; positions
/// are token ordinals within the input, so phrase-adjacent terms have
/// consecutive positions.
#[must_use]
pub fn tokenize(text: &str) -> BTreeMap<String, Vec<usize>> {
    let word = Regex::new(TERM_PATTERN).expect("Invalid regex");
    let lowered = text.to_lowercase();

    let mut terms: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (position, found) in word.find_iter(&lowered).enumerate() {
        terms
            .entry(found.as_str().to_string())
            .or_default()
            .push(position);
    }
    terms
}

/// Normalize a single query term the same way indexed text is tokenized.
///
/// Returns `None` when the input contains no indexable characters.
#[must_use]
pub fn normalize_term(raw: &str) -> Option<String> {
    let word = Regex::new(TERM_PATTERN).expect("Invalid regex");
    let lowered = raw.to_lowercase();
    let mut parts = word.find_iter(&lowered).map(|found| found.as_str());
    let first = parts.next()?;

    // A "term" that tokenizes to several words keeps only its first word;
    // multi-word queries arrive as separate terms from the CLI.
    Some(first.to_string())
}
