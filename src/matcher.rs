use crate::normalizer::{canonicalize_place, normalize, tokenize_place};
use log::debug;

/// Default minimum similarity for the fuzzy fallback
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.90;

/// Bare state name that needs the dedicated guard
const STATE_NAME: &str = "goias";
/// State abbreviation, ignored next to the state name
const STATE_ABBREVIATION: &str = "go";

/// File extension left behind when the candidate is a filename
const FILE_EXTENSION: &str = "pdf";

/// Decides which canonical municipality a file belongs to
///
/// Strategies, in order:
/// 1. Canonical substring (catches names glued together in filenames)
/// 2. Token subset (catches word order and extra words)
/// 3. Similarity ratio (catches small spelling divergence)
///
/// The bare state name "Goiás" bypasses all three and uses a stricter
/// token rule, since many municipalities carry it as a qualifier.
#[derive(Debug, Clone)]
pub struct MunicipalityMatcher {
    similarity_threshold: f64,
}

impl Default for MunicipalityMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl MunicipalityMatcher {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Does `candidate_text` (a filename or body text) refer to `canonical_name`?
    pub fn matches(&self, candidate_text: &str, canonical_name: &str) -> bool {
        if normalize(canonical_name) == STATE_NAME {
            return matches_state_name(candidate_text);
        }

        let candidate = canonicalize_place(candidate_text);
        let canonical = canonicalize_place(canonical_name);
        if candidate.is_empty() || canonical.is_empty() {
            return false;
        }

        if candidate.contains(&canonical) {
            debug!("{:?} matches {:?} by canonical substring", candidate_text, canonical_name);
            return true;
        }

        let canonical_tokens = tokenize_place(canonical_name);
        let candidate_tokens = tokenize_place(candidate_text);
        if canonical_tokens.is_subset(&candidate_tokens) {
            debug!("{:?} matches {:?} by token subset", candidate_text, canonical_name);
            return true;
        }

        let ratio = similarity_ratio(&candidate, &canonical);
        if ratio >= self.similarity_threshold {
            debug!(
                "{:?} matches {:?} by similarity {:.3}",
                candidate_text, canonical_name, ratio
            );
            return true;
        }

        false
    }

    /// First entity (in caller order) that `candidate_text` matches
    ///
    /// Ties are not detected: a file matching two selected entities goes to
    /// whichever comes first.
    pub fn assign<'a, S: AsRef<str>>(&self, candidate_text: &str, entities: &'a [S]) -> Option<&'a str> {
        entities
            .iter()
            .map(AsRef::as_ref)
            .find(|entity| self.matches(candidate_text, entity))
    }
}

/// Match with the default threshold
pub fn matches(candidate_text: &str, canonical_name: &str) -> bool {
    MunicipalityMatcher::default().matches(candidate_text, canonical_name)
}

fn matches_state_name(candidate_text: &str) -> bool {
    let tokens = tokenize_place(candidate_text);
    if !tokens.contains(STATE_NAME) {
        return false;
    }
    tokens
        .iter()
        .filter(|token| *token != STATE_NAME && *token != STATE_ABBREVIATION)
        .all(|token| is_state_neutral(token))
}

// Years and the extension are the only tokens a bare state filename carries
fn is_state_neutral(token: &str) -> bool {
    token == FILE_EXTENSION || token.chars().all(|c| c.is_ascii_digit())
}

/// Character-level similarity in `0.0..=1.0`
///
/// Twice the number of characters covered by the recursive longest-common-
/// block decomposition, divided by the combined length. Two empty strings
/// are identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut pending = vec![(0, a.len(), 0, b.len())];
    let mut matched = 0;

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_block(a, b, (alo, ahi), (blo, bhi));
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    matched
}

/// Longest common block inside the given ranges; earliest in `a`, then in
/// `b`, on ties.
fn longest_block(
    a: &[char],
    b: &[char],
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let width = bhi - blo;
    let mut best = (alo, blo, 0);
    let mut previous = vec![0usize; width + 1];

    for i in alo..ahi {
        let mut current = vec![0usize; width + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let run = previous[j - blo] + 1;
                current[j - blo + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        previous = current;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_word_and_substring_path() {
        assert!(matches("Prefeitura Municipal de Catalão.pdf", "Catalão"));
        assert!(matches("RELATORIO_CATALAO_2024.pdf", "Catalão"));
    }

    #[test]
    fn test_state_name_guard() {
        assert!(!matches("RELATORIO GOIATUBA 2024", "Goiás"));
        assert!(matches("GOIAS 2024", "Goiás"));
        assert!(matches("Goiás - GO 2024.pdf", "Goiás"));
        assert!(!matches("Goiás do Norte", "Goiás"));
        assert!(!matches("Nova Goiás 2024", "goias"));
    }

    #[test]
    fn test_state_name_rejects_any_other_word() {
        assert!(matches("GOIAS.pdf", "Goiás"));
        assert!(!matches("GOIAS SITUACAO FISCAL.pdf", "Goiás"));
        assert!(!matches("Relatório Goiás 2024", "Goiás"));
        assert!(!matches("CND GOIAS", "Goiás"));
    }

    #[test]
    fn test_state_qualified_municipality_does_not_match_state() {
        assert!(!matches("GOIAS", "Goiás do Norte"));
        assert!(matches("Prefeitura de Goiás do Norte", "Goiás do Norte"));
    }

    #[test]
    fn test_token_subset_path() {
        assert!(matches("Montes Belos - São Luís 2023", "São Luís de Montes Belos"));
        assert!(!matches("São Luís 2023", "São Luís de Montes Belos"));
    }

    #[test]
    fn test_similarity_path() {
        assert!(matches("Annapolis", "Anápolis"));
        assert!(!matches("Goianezia", "Goianésia"));
    }

    #[test]
    fn test_empty_canonical_forms_never_match() {
        assert!(!matches("", "Catalão"));
        assert!(!matches("Prefeitura Municipal", "Catalão"));
        assert!(!matches("Catalão", "Prefeitura"));
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abc", "abc"), 1.0);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        let ratio = similarity_ratio("goianesia", "goianezia");
        assert!((ratio - 16.0 / 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_assign_first_match_wins() {
        let matcher = MunicipalityMatcher::default();
        let entities = vec!["Rio Verde".to_string(), "Verde".to_string()];
        assert_eq!(matcher.assign("CND RIO VERDE.pdf", &entities), Some("Rio Verde"));

        let reversed = vec!["Verde".to_string(), "Rio Verde".to_string()];
        assert_eq!(matcher.assign("CND RIO VERDE.pdf", &reversed), Some("Verde"));

        assert_eq!(matcher.assign("Jataí.pdf", &entities), None);
    }
}
