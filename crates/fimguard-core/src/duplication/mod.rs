//! Batch duplication detection over a finished completion
//!
//! The detector splits code into blocks, fingerprints each block, groups
//! exact, near and structural duplicates, finds line cycles repeated back to
//! back, and rebuilds the code without the repeated occurrences.

pub mod blocks;
pub mod fingerprint;
pub mod language;
pub mod patterns;
pub mod report;
pub mod similarity;

pub use blocks::CodeBlock;
pub use fingerprint::{CacheStats, CodeFingerprint, FingerprintCache};
pub use language::LanguageFamily;
pub use report::{DuplicateBlock, DuplicateKind, DuplicateReport, LineSpan, RepetitionPattern};

use crate::config::{DetectorConfig, DEFAULT_CACHE_SIZE};
use crate::{CoreError, Result};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

/// Finds and removes duplicated content in completed code
#[derive(Debug)]
pub struct DuplicationDetector {
    config: DetectorConfig,
    cache: FingerprintCache,
}

impl DuplicationDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_max_size).ok_or_else(|| {
            CoreError::invalid_field(
                "DETECTOR_CACHE_ZERO",
                "cache_max_size",
                "cache_max_size must be greater than 0",
                "Duplication detector configuration",
                "Use a cache size such as 256",
            )
        })?;
        Ok(Self {
            config,
            cache: FingerprintCache::new(capacity),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Fingerprint `code`, reusing a cached result when available
    pub fn generate_fingerprint(&self, code: &str, language: Option<&str>) -> Arc<CodeFingerprint> {
        self.cache.get_or_compute(code, family(language))
    }

    /// Similarity of two code fragments in `[0, 1]`
    pub fn calculate_similarity(&self, a: &str, b: &str, language: Option<&str>) -> f64 {
        let left = self.generate_fingerprint(a, language);
        let right = self.generate_fingerprint(b, language);
        similarity::combined_similarity(&left, &right, &self.config.weights)
    }

    pub fn extract_blocks(&self, code: &str, language: Option<&str>) -> Vec<CodeBlock> {
        blocks::extract_blocks(code, family(language))
    }

    /// Group duplicated blocks; each block belongs to at most one group
    pub fn find_duplicate_blocks(&self, blocks: &[CodeBlock], language: Option<&str>) -> Vec<DuplicateBlock> {
        let fingerprints: Vec<_> = blocks
            .iter()
            .map(|block| self.generate_fingerprint(&block.content, language))
            .collect();
        blocks::group_duplicates(blocks, &fingerprints, &self.config)
    }

    /// Find line cycles repeated back to back
    pub fn detect_distributed_repetition(&self, lines: &[&str], language: Option<&str>) -> Vec<RepetitionPattern> {
        patterns::detect_patterns(
            lines,
            family(language),
            self.config.min_pattern_repetitions,
            self.config.max_pattern_length,
        )
    }

    /// Run block and pattern detection and produce cleaned code
    pub fn detect_duplicates(&self, code: &str, language: Option<&str>) -> DuplicateReport {
        if code.trim().is_empty() {
            return DuplicateReport::clean(code);
        }

        let blocks = self.extract_blocks(code, language);
        let duplicate_blocks = self.find_duplicate_blocks(&blocks, language);
        let lines: Vec<&str> = code.lines().collect();
        let distributed_patterns = if self.config.enable_distributed_detection {
            self.detect_distributed_repetition(&lines, language)
        } else {
            Vec::new()
        };

        if duplicate_blocks.is_empty() && distributed_patterns.is_empty() {
            debug!(blocks = blocks.len(), "No duplicates found");
            return DuplicateReport::clean(code);
        }

        let (removed, duplicates_removed) = mark_removals(lines.len(), &duplicate_blocks, &distributed_patterns);
        let cleaned_code = rebuild(code, &lines, &removed);

        let report = DuplicateReport {
            has_duplicates: true,
            original_line_count: lines.len(),
            cleaned_line_count: cleaned_code.lines().count(),
            duplicate_blocks,
            distributed_patterns,
            cleaned_code,
            duplicates_removed,
        };
        info!(
            groups = report.duplicate_blocks.len(),
            patterns = report.distributed_patterns.len(),
            removed = report.duplicates_removed,
            lines_before = report.original_line_count,
            lines_after = report.cleaned_line_count,
            "Duplicate content detected"
        );
        report
    }

    /// Drop every non-first occurrence of exact and near groups and every
    /// repeated pattern cycle. Structural groups are left in place.
    pub fn remove_duplicates(
        &self,
        code: &str,
        duplicate_blocks: &[DuplicateBlock],
        patterns: &[RepetitionPattern],
    ) -> String {
        let lines: Vec<&str> = code.lines().collect();
        let (removed, _) = mark_removals(lines.len(), duplicate_blocks, patterns);
        rebuild(code, &lines, &removed)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Cleared fingerprint cache");
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Default for DuplicationDetector {
    fn default() -> Self {
        Self {
            config: DetectorConfig::default(),
            cache: FingerprintCache::new(DEFAULT_CACHE_SIZE),
        }
    }
}

/// Flag the lines to drop and count the occurrences that actually went away.
///
/// Blocks are marked before patterns. A block occurrence or pattern cycle
/// counts only when it covers at least one line not already dropped.
fn mark_removals(
    line_count: usize,
    duplicate_blocks: &[DuplicateBlock],
    patterns: &[RepetitionPattern],
) -> (Vec<bool>, usize) {
    let mut removed = vec![false; line_count];
    let mut count = 0;

    for group in duplicate_blocks.iter().filter(|g| g.kind.is_removable()) {
        for span in group.locations.iter().skip(1) {
            if drop_span(&mut removed, span.start_line, span.end_line) {
                count += 1;
            }
        }
    }
    for pattern in patterns {
        for cycle in pattern.cycles.iter().skip(1) {
            let fresh = removed
                .iter()
                .take(cycle.end_line.saturating_add(1))
                .skip(cycle.start_line)
                .any(|flag| !*flag);
            if fresh {
                count += 1;
            }
        }
        // Blank lines between repeated cycles go too
        drop_span(&mut removed, pattern.first_cycle_end + 1, pattern.end_line);
    }
    (removed, count)
}

/// Mark `start..=end`; true when any line in it was not marked yet
fn drop_span(removed: &mut [bool], start: usize, end: usize) -> bool {
    let mut fresh = false;
    for flag in removed.iter_mut().take(end.saturating_add(1)).skip(start) {
        fresh |= !*flag;
        *flag = true;
    }
    fresh
}

/// Reassemble the kept lines, collapsing blank lines left adjacent by a removal
fn rebuild(code: &str, lines: &[&str], removed: &[bool]) -> String {
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut after_removal = false;
    for (line, dropped) in lines.iter().zip(removed) {
        if *dropped {
            after_removal = true;
            continue;
        }
        if after_removal
            && line.trim().is_empty()
            && kept.last().map_or(true, |prev| prev.trim().is_empty())
        {
            continue;
        }
        after_removal = false;
        kept.push(*line);
    }
    if after_removal {
        while kept.last().is_some_and(|line| line.trim().is_empty()) {
            kept.pop();
        }
    }

    let mut cleaned = kept.join("\n");
    if code.ends_with('\n') && !cleaned.is_empty() {
        cleaned.push('\n');
    }
    cleaned
}

fn family(language: Option<&str>) -> LanguageFamily {
    language.map(LanguageFamily::from_id).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPEATED: &str = "function foo() {\n  return 1;\n}\nfunction foo() {\n  return 1;\n}";

    #[test]
    fn test_detect_exact_duplicate_function() {
        let detector = DuplicationDetector::default();
        let report = detector.detect_duplicates(REPEATED, Some("javascript"));
        assert!(report.has_duplicates);
        assert_eq!(report.cleaned_code, "function foo() {\n  return 1;\n}");
        assert_eq!(report.original_line_count, 6);
        assert_eq!(report.cleaned_line_count, 3);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.duplicate_blocks[0].kind, DuplicateKind::Exact);
    }

    #[test]
    fn test_empty_and_blank_input() {
        let detector = DuplicationDetector::default();
        let report = detector.detect_duplicates("", None);
        assert!(!report.has_duplicates);
        assert_eq!(report.cleaned_code, "");

        let report = detector.detect_duplicates("  \n\n", None);
        assert!(!report.has_duplicates);
        assert_eq!(report.cleaned_code, "  \n\n");
    }

    #[test]
    fn test_unique_code_is_unchanged() {
        let code = "fn a() -> u32 {\n    1\n}\n\nfn b(x: &str) -> usize {\n    x.len()\n}\n";
        let report = DuplicationDetector::default().detect_duplicates(code, Some("rust"));
        assert!(!report.has_duplicates);
        assert_eq!(report.cleaned_code, code);
    }

    #[test]
    fn test_remove_keeps_trailing_newline_and_collapses_blanks() {
        let code = "let total = compute(a, b);\nlog(total);\n\nlet total = compute(a, b);\nlog(total);\n\nok();\n";
        let report = DuplicationDetector::default().detect_duplicates(code, Some("javascript"));
        assert_eq!(report.cleaned_code, "let total = compute(a, b);\nlog(total);\n\nok();\n");
    }

    #[test]
    fn test_distributed_pattern_removed() {
        let code = "a = read()\nb = parse(a)\na = read()\nb = parse(a)\na = read()\nb = parse(a)\ndone()";
        let report = DuplicationDetector::default().detect_duplicates(code, Some("python"));
        assert_eq!(report.distributed_patterns.len(), 1);
        assert_eq!(report.cleaned_code, "a = read()\nb = parse(a)\ndone()");
    }

    #[test]
    fn test_overlapping_removals_counted_once() {
        let code = "function foo() {\n  return 1;\n}\n".repeat(3);
        let report = DuplicationDetector::default().detect_duplicates(&code, Some("javascript"));
        assert_eq!(report.duplicate_blocks[0].occurrences, 3);
        assert_eq!(report.distributed_patterns.len(), 1);
        assert_eq!(report.cleaned_code, "function foo() {\n  return 1;\n}\n");
        assert_eq!(report.cleaned_line_count, 3);
        assert_eq!(report.duplicates_removed, 2);
    }

    #[test]
    fn test_default_matches_configured_build() {
        let built = DuplicationDetector::new(DetectorConfig::default()).unwrap();
        let default = DuplicationDetector::default();
        assert_eq!(built.get_cache_stats(), default.get_cache_stats());
        assert_eq!(default.get_cache_stats().max_size, DetectorConfig::default().cache_max_size);
    }

    #[test]
    fn test_distributed_detection_can_be_disabled() {
        let config = DetectorConfig { enable_distributed_detection: false, ..Default::default() };
        let detector = DuplicationDetector::new(config).unwrap();
        let lines = ["x = 1", "y = 2", "x = 1", "y = 2", "x = 1", "y = 2"].join("\n");
        let report = detector.detect_duplicates(&lines, None);
        assert!(report.distributed_patterns.is_empty());
    }

    #[test]
    fn test_structural_groups_are_not_removed() {
        let code = "function foo() {\n  return 1;\n}\nfunction bar() {\n  return 2;\n}";
        let report = DuplicationDetector::default().detect_duplicates(code, Some("javascript"));
        assert!(report.has_duplicates);
        assert_eq!(report.duplicate_blocks[0].kind, DuplicateKind::Structural);
        assert_eq!(report.cleaned_code, code);
        assert_eq!(report.duplicates_removed, 0);
    }

    #[test]
    fn test_cache_stats_and_clear() {
        let config = DetectorConfig { cache_max_size: 2, ..Default::default() };
        let detector = DuplicationDetector::new(config).unwrap();
        detector.generate_fingerprint("a", None);
        detector.generate_fingerprint("b", None);
        detector.generate_fingerprint("c", None);
        assert_eq!(detector.get_cache_stats(), CacheStats { size: 2, max_size: 2 });
        detector.clear_cache();
        assert_eq!(detector.get_cache_stats().size, 0);
    }

    #[test]
    fn test_similarity_identity() {
        let detector = DuplicationDetector::default();
        let code = "if (x) { y(); }";
        assert_eq!(detector.calculate_similarity(code, code, Some("c")), 1.0);
    }

    #[test]
    fn test_invalid_config() {
        let config = DetectorConfig { similarity_threshold: 1.5, ..Default::default() };
        assert!(DuplicationDetector::new(config).is_err());
    }
}
