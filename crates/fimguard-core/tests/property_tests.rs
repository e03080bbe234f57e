//! Property-based tests for detector invariants
//!
//! These tests use proptest to generate arbitrary code-like inputs and check
//! symmetry, monotonicity and cache transparency.

use fimguard_core::prelude::*;
use proptest::prelude::*;

prop_compose! {
    fn arb_code()(
        lines in prop::collection::vec("[a-z_]{1,8}( [=+*<>(){};,]{1,2} [a-z0-9_]{1,6}){0,4}", 0..12)
    ) -> String {
        lines.join("\n")
    }
}

prop_compose! {
    fn arb_line()(name in "[a-z]{1,8}", value in 0u32..1000) -> String {
        format!("{} = compute({});", name, value)
    }
}

proptest! {
    /// sim(a, a) == 1 and sim(a, b) == sim(b, a)
    #[test]
    fn test_similarity_identity_and_symmetry(a in arb_code(), b in arb_code()) {
        let detector = DuplicationDetector::default();
        prop_assert_eq!(detector.calculate_similarity(&a, &a, Some("javascript")), 1.0);

        let ab = detector.calculate_similarity(&a, &b, Some("javascript"));
        let ba = detector.calculate_similarity(&b, &a, Some("javascript"));
        prop_assert_eq!(ab, ba);
        prop_assert!((0.0..=1.0).contains(&ab));
    }

    /// Counters equal the number of tokens and embedded newlines since reset
    #[test]
    fn test_stop_counters_are_monotonic(tokens in prop::collection::vec("[a-z\n ]{0,6}", 0..64)) {
        let mut detector = StopDetector::new(&StopConfig::default()).unwrap();
        detector.track_token("stale\n");
        detector.reset();

        let mut previous = detector.get_stats();
        for token in &tokens {
            detector.track_token(token);
            let stats = detector.get_stats();
            prop_assert_eq!(stats.tokens, previous.tokens + 1);
            prop_assert!(stats.lines >= previous.lines);
            previous = stats;
        }
        let newlines: usize = tokens.iter().map(|t| t.matches('\n').count()).sum();
        prop_assert_eq!(detector.get_stats(), StopStats { tokens: tokens.len(), lines: newlines });
    }

    /// Cached, cleared and fresh fingerprints are identical
    #[test]
    fn test_fingerprint_cache_transparency(code in arb_code()) {
        let warm = DuplicationDetector::default();
        let first = warm.generate_fingerprint(&code, Some("rust"));
        let cached = warm.generate_fingerprint(&code, Some("rust"));
        warm.clear_cache();
        let recomputed = warm.generate_fingerprint(&code, Some("rust"));
        let fresh = DuplicationDetector::default().generate_fingerprint(&code, Some("rust"));

        prop_assert_eq!(&*first, &*cached);
        prop_assert_eq!(&*first, &*recomputed);
        prop_assert_eq!(&*first, &*fresh);
    }

    /// A two-line cycle repeated k times is reported once with k occurrences
    #[test]
    fn test_two_line_cycles(a in arb_line(), b in arb_line(), cycles in 3usize..8) {
        prop_assume!(a != b);
        let mut lines = Vec::new();
        for _ in 0..cycles {
            lines.push(a.as_str());
            lines.push(b.as_str());
        }
        let detector = DuplicationDetector::default();
        let patterns = detector.detect_distributed_repetition(&lines, Some("javascript"));
        prop_assert_eq!(patterns.len(), 1);
        prop_assert_eq!(patterns[0].pattern_elements.len(), 2);
        prop_assert_eq!(patterns[0].occurrences, cycles);
        prop_assert_eq!(patterns[0].end_line, cycles * 2 - 1);
    }

    /// Lines longer than the minimum are flagged from the third occurrence on
    #[test]
    fn test_exact_duplicate_threshold(line in arb_line(), repeats in 1usize..8) {
        let mut filter = StreamingFilter::new(StreamingConfig::default()).unwrap();
        for i in 0..repeats {
            prop_assert_eq!(filter.is_exact_duplicate(&line, i, None), i >= 2);
        }
        filter.reset();
        prop_assert!(!filter.is_exact_duplicate(&line, 0, None));
    }
}

#[test]
fn test_distinct_lines_have_no_pattern() {
    let lines: Vec<String> = (0..20).map(|i| format!("step_{i}();")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let detector = DuplicationDetector::default();
    assert!(detector.detect_distributed_repetition(&refs, None).is_empty());
}
