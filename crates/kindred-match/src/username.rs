//! Username similarity scoring.
//!
//! Handles are compared after normalization (case-folded, separators
//! stripped) so `Crypto.King` and `crypto_king` read as the same handle.
//! Scoring: exact match 100, containment 85, otherwise normalized edit
//! distance scaled to 0-100.

/// Normalize a handle for comparison: lowercase, alphanumerics only.
pub fn normalize(username: &str) -> String {
    username
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Levenshtein edit distance over characters, single-row DP.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            let next = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

/// Similarity of two raw usernames, 0-100.
///
/// Both are normalized first; an empty normalized handle never matches
/// anything (all-symbol usernames carry no signal).
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 100.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 85.0;
    }

    let distance = levenshtein(&a, &b) as f32;
    let max_len = a.chars().count().max(b.chars().count()) as f32;
    ((1.0 - distance / max_len) * 100.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators_and_case() {
        assert_eq!(normalize("Crypto.King"), "cryptoking");
        assert_eq!(normalize("crypto_king-99"), "cryptoking99");
        assert_eq!(normalize("___"), "");
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn test_exact_match_scores_100() {
        assert_eq!(similarity("cryptoking", "cryptoking"), 100.0);
        // Normalization makes these exact.
        assert_eq!(similarity("Crypto_King", "cryptoking"), 100.0);
    }

    #[test]
    fn test_containment_scores_85() {
        assert_eq!(similarity("cryptoking", "cryptoking99"), 85.0);
        assert_eq!(similarity("thecryptoking", "cryptoking"), 85.0);
    }

    #[test]
    fn test_edit_distance_scaling() {
        // "cryptoking" vs "cryptokong": distance 1 over length 10.
        let score = similarity("cryptoking", "cryptokong");
        assert!((score - 90.0).abs() < 0.01, "got {score}");
    }

    #[test]
    fn test_unrelated_handles_score_low() {
        assert!(similarity("cryptoking", "gardenfan") < 40.0);
    }

    #[test]
    fn test_empty_normalized_never_matches() {
        assert_eq!(similarity("___", "___"), 0.0);
        assert_eq!(similarity("", "cryptoking"), 0.0);
    }
}
