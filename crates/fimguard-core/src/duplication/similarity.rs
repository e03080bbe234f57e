//! Similarity signals between two fingerprints
//!
//! Every signal is symmetric and bounded to `[0, 1]`. Set and count based
//! signals work on integers until the final division so that swapping the
//! arguments yields bit-identical results.

use super::fingerprint::CodeFingerprint;
use crate::config::SimilarityWeights;
use std::collections::{HashMap, HashSet};

/// Raw Hamming similarity of two 64-bit hashes
pub fn hamming_similarity(a: u64, b: u64) -> f64 {
    1.0 - f64::from((a ^ b).count_ones()) / 64.0
}

/// SimHash similarity rescaled so that unrelated inputs (about 32 differing
/// bits) score near zero instead of near one half
pub fn simhash_similarity(a: u64, b: u64) -> f64 {
    (1.0 - 2.0 * f64::from((a ^ b).count_ones()) / 64.0).max(0.0)
}

/// `1 - distance / longer_length` over token sequences
pub fn levenshtein_similarity(a: &[String], b: &[String]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    // generic_levenshtein wants a sized collection behind the reference
    let left: Vec<&str> = a.iter().map(String::as_str).collect();
    let right: Vec<&str> = b.iter().map(String::as_str).collect();
    let distance = strsim::generic_levenshtein(&left, &right);
    1.0 - distance as f64 / longest as f64
}

/// Jaccard index of the token sets
pub fn jaccard_similarity(a: &[String], b: &[String]) -> f64 {
    let left: HashSet<&str> = a.iter().map(String::as_str).collect();
    let right: HashSet<&str> = b.iter().map(String::as_str).collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.len() + right.len() - shared;
    shared as f64 / union as f64
}

fn counts(tokens: &[String]) -> HashMap<&str, u64> {
    let mut counts = HashMap::with_capacity(tokens.len());
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0u64) += 1;
    }
    counts
}

/// Cosine similarity of token frequency vectors
pub fn cosine_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let left = counts(a);
    let right = counts(b);
    let dot: u64 = left
        .iter()
        .filter_map(|(token, l)| right.get(token).map(|r| l * r))
        .sum();
    let left_norm: u64 = left.values().map(|c| c * c).sum();
    let right_norm: u64 = right.values().map(|c| c * c).sum();
    let denom = (left_norm as f64).sqrt() * (right_norm as f64).sqrt();
    (dot as f64 / denom).min(1.0)
}

/// Weighted combination of all signals.
///
/// Identical normalized text short-circuits to exactly 1.0.
pub fn combined_similarity(a: &CodeFingerprint, b: &CodeFingerprint, weights: &SimilarityWeights) -> f64 {
    if a.same_content(b) {
        return 1.0;
    }
    if a.token_sequence.is_empty() || b.token_sequence.is_empty() {
        return 0.0;
    }
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }

    let score = weights.simhash * simhash_similarity(a.similarity_hash, b.similarity_hash)
        + weights.levenshtein * levenshtein_similarity(&a.token_sequence, &b.token_sequence)
        + weights.jaccard * jaccard_similarity(&a.token_sequence, &b.token_sequence)
        + weights.cosine * cosine_similarity(&a.token_sequence, &b.token_sequence);
    (score / total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplication::fingerprint::tokenize;
    use crate::duplication::LanguageFamily;

    fn fp(code: &str) -> CodeFingerprint {
        CodeFingerprint::compute(code, LanguageFamily::CLike)
    }

    #[test]
    fn test_hamming() {
        assert_eq!(hamming_similarity(0, 0), 1.0);
        assert_eq!(hamming_similarity(0, u64::MAX), 0.0);
        assert_eq!(simhash_similarity(0, u64::MAX), 0.0);
        assert_eq!(simhash_similarity(0, 0xFFFF_FFFF), 0.0);
    }

    #[test]
    fn test_levenshtein_on_tokens() {
        let a = tokenize("a = b + c ;");
        let b = tokenize("a = b - c ;");
        assert!((levenshtein_similarity(&a, &b) - 5.0 / 6.0).abs() < 1e-12);
        assert_eq!(levenshtein_similarity(&[], &[]), 1.0);
    }

    #[test]
    fn test_jaccard_and_cosine() {
        let a = tokenize("x y z");
        let b = tokenize("x y w");
        assert!((jaccard_similarity(&a, &b) - 0.5).abs() < 1e-12);
        assert!((cosine_similarity(&a, &b) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }

    #[test]
    fn test_identical_text_scores_one() {
        let a = fp("for (let i = 0; i < n; i++) {\n  total += i;\n}");
        let b = fp("for (let i = 0; i < n; i++) {   // sum\n  total += i;\n}");
        assert_eq!(combined_similarity(&a, &b, &SimilarityWeights::default()), 1.0);
    }

    #[test]
    fn test_near_duplicate_scores_high() {
        let a = fp("function area(r) {\n  const pi = 3.14159;\n  return pi * r * r;\n}");
        let b = fp("function area(radius) {\n  const pi = 3.14159;\n  return pi * radius * radius;\n}");
        let score = combined_similarity(&a, &b, &SimilarityWeights::default());
        assert!(score > 0.6, "score = {score}");
        assert!(score < 1.0);
    }

    #[test]
    fn test_disjoint_scores_low() {
        let a = fp("alpha beta gamma delta epsilon zeta eta theta");
        let b = fp("1 + 2 * 3 - 4 / 5 % 6 == 7");
        let score = combined_similarity(&a, &b, &SimilarityWeights::default());
        assert!(score < 0.25, "score = {score}");
    }

    #[test]
    fn test_symmetry() {
        let a = fp("if (ready) { start(); } else { wait(100); }");
        let b = fp("if (ready) { start(); stop(); } else { wait(250); }");
        let weights = SimilarityWeights::default();
        assert_eq!(combined_similarity(&a, &b, &weights), combined_similarity(&b, &a, &weights));
    }
}
