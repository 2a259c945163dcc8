use std::collections::BTreeSet;

use log::trace;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Words that never distinguish one place name from another
///
/// "municipio de" can never equal a single token; it stays in the set so
/// the list mirrors the one operators maintain for the report headers.
pub const STOP_WORDS: &[&str] = &[
    "de",
    "da",
    "do",
    "das",
    "dos",
    "municipio",
    "municipio de",
    "camara",
    "prefeitura",
    "municipal",
];

/// Strip accents and lowercase
///
/// Unicode-decomposes the text, drops combining marks, lowercases and trims.
/// Total and pure: every input has a normalization.
pub fn normalize(text: &str) -> String {
    fold(text).trim().to_string()
}

/// Canonical concatenated form of a place name
///
/// Steps:
/// 1. Lowercase and fold accents
/// 2. Split on every run of non-alphanumeric characters
/// 3. Drop stop-words
/// 4. Join the remaining tokens with no separator
///
/// A result that is itself a stop-word collapses to empty so that the
/// function stays idempotent.
pub fn canonicalize_place(text: &str) -> String {
    let joined: String = place_tokens(text).concat();
    if is_stop_word(&joined) {
        return String::new();
    }
    trace!("canonicalized {:?} -> {:?}", text, joined);
    joined
}

/// Token set used by the matcher (same pipeline as `canonicalize_place`)
pub fn tokenize_place(text: &str) -> BTreeSet<String> {
    place_tokens(text).into_iter().collect()
}

fn place_tokens(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty() && !is_stop_word(token))
        .map(str::to_string)
        .collect()
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

// Lowercase before decomposing: some uppercase letters lowercase into a
// base letter plus a combining mark.
fn fold(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}
