//! Streaming duplication filter
//!
//! Cheap per-line checks run while a completion streams in. The filter keeps
//! a bounded map of normalized line contents and a short history of file
//! banner lines; both are cleared by [`StreamingFilter::reset`].

use crate::config::StreamingConfig;
use crate::duplication::LanguageFamily;
use crate::stop::BANNER_PATTERN;
use crate::{CoreError, Result};
use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

lazy_static! {
    static ref BANNER_LINE: Regex = Regex::new(&format!("(?i){}", BANNER_PATTERN)).unwrap();
}

/// Delimiters that separate fragments in `a|a|a` style tails
const FRAGMENT_DELIMITERS: &[char] = &['|', ',', ';'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineRecord {
    count: usize,
    first_index: usize,
}

/// Per-request repetition state for one streamed completion
#[derive(Debug)]
pub struct StreamingFilter {
    config: StreamingConfig,
    line_counts: LruCache<String, LineRecord>,
    banners: VecDeque<(String, usize)>,
}

impl StreamingFilter {
    pub fn new(config: StreamingConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max_tracked_lines).ok_or_else(|| {
            CoreError::invalid_field(
                "STREAMING_THRESHOLD_ZERO",
                "max_tracked_lines",
                "max_tracked_lines must be greater than 0",
                "Streaming filter configuration",
                "Use a positive threshold",
            )
        })?;
        Ok(Self {
            banners: VecDeque::with_capacity(config.metadata_history),
            line_counts: LruCache::new(capacity),
            config,
        })
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Forget every tracked line and banner
    pub fn reset(&mut self) {
        self.line_counts.clear();
        self.banners.clear();
    }

    /// Record a completed line. Only file/path banner lines are retained.
    pub fn track_line(&mut self, line: &str) {
        let key = line.trim();
        if key.is_empty() || !BANNER_LINE.is_match(key) {
            return;
        }
        if let Some(entry) = self.banners.iter_mut().find(|(seen, _)| seen == key) {
            entry.1 += 1;
            return;
        }
        if self.banners.len() == self.config.metadata_history {
            self.banners.pop_front();
        }
        self.banners.push_back((key.to_string(), 1));
    }

    /// Whether `line` is a banner that was already tracked before.
    ///
    /// Call after [`track_line`](Self::track_line) for the same line: the
    /// first sighting is never a loop.
    pub fn is_metadata_loop(&self, line: &str) -> bool {
        let key = line.trim();
        let repeated = self
            .banners
            .iter()
            .any(|(seen, count)| seen == key && *count >= 2);
        if repeated {
            debug!(line = key, "Repeated file banner");
        }
        repeated
    }

    /// Count an occurrence of `line` and report whether it has now been seen
    /// more often than allowed.
    ///
    /// Lines shorter than `min_line_length` after normalization are never
    /// duplicates. `line_index` is remembered as the first-sighting hint.
    pub fn is_exact_duplicate(&mut self, line: &str, line_index: usize, language: Option<&str>) -> bool {
        let key = normalize(line, language);
        if key.chars().count() < self.config.min_line_length {
            return false;
        }
        let record = self.line_counts.get_or_insert_mut(key, || LineRecord {
            count: 0,
            first_index: line_index,
        });
        record.count += 1;
        let duplicate = record.count > self.config.max_line_occurrences;
        if duplicate {
            trace!(
                count = record.count,
                first_index = record.first_index,
                line_index,
                "Exact duplicate line"
            );
        }
        duplicate
    }

    /// Index at which a line was first counted, if it is still tracked
    pub fn first_seen(&self, line: &str, language: Option<&str>) -> Option<usize> {
        self.line_counts
            .peek(&normalize(line, language))
            .map(|record| record.first_index)
    }

    /// Whether a block of at least `block_min_lines` lines and
    /// `block_min_chars` characters appears twice, verbatim and without
    /// overlap, in `text`.
    pub fn is_block_repetition(&self, text: &str) -> bool {
        let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
        let n = lines.len();
        let min_lines = self.config.block_min_lines;
        if n < min_lines * 2 {
            return false;
        }

        for start in 0..n {
            if lines[start].trim().is_empty() {
                continue;
            }
            // Smallest window from here that is big enough to count
            let mut chars = 0;
            let mut end = start;
            while end < n && (end - start < min_lines || chars < self.config.block_min_chars) {
                chars += lines[end].trim().chars().count();
                end += 1;
            }
            if end - start < min_lines || chars < self.config.block_min_chars {
                // Windows only shrink from later starts
                return false;
            }
            let block = &lines[start..end];
            let len = block.len();
            if (end..=n.saturating_sub(len)).any(|other| lines[other..other + len] == *block) {
                debug!(start, len, "Repeated block in stream");
                return true;
            }
        }
        false
    }

    /// Whether `text` degenerated into one word, delimiter-joined fragment
    /// or character repeated back to back past the configured thresholds.
    pub fn is_word_repetition(&self, text: &str) -> bool {
        if text.chars().count() < self.config.min_repetition_text {
            return false;
        }

        let char_run = longest_char_run(text);
        if char_run >= self.config.char_repetition_threshold {
            trace!(run = char_run, "Character repetition");
            return true;
        }

        let word_run = longest_run(text.split_whitespace());
        if word_run >= self.config.word_repetition_threshold {
            trace!(run = word_run, "Word repetition");
            return true;
        }

        let fragment_run = longest_run(
            text.split(|c: char| c.is_whitespace() || FRAGMENT_DELIMITERS.contains(&c))
                .filter(|fragment| fragment.chars().count() >= 2),
        );
        if fragment_run >= self.config.word_repetition_threshold {
            trace!(run = fragment_run, "Fragment repetition");
            return true;
        }
        false
    }

    /// Number of distinct lines currently tracked
    pub fn tracked_lines(&self) -> usize {
        self.line_counts.len()
    }
}

fn normalize(line: &str, language: Option<&str>) -> String {
    language
        .map(LanguageFamily::from_id)
        .unwrap_or_default()
        .normalize_line(line)
}

/// Length of the longest run of equal consecutive items
fn longest_run<T: PartialEq, I: IntoIterator<Item = T>>(items: I) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<T> = None;
    for item in items {
        if previous.as_ref() == Some(&item) {
            current += 1;
        } else {
            current = 1;
        }
        longest = longest.max(current);
        previous = Some(item);
    }
    longest
}

/// Longest run of one non-whitespace character; whitespace breaks runs
fn longest_char_run(text: &str) -> usize {
    longest_run(
        text.chars()
            .enumerate()
            .map(|(i, c)| if c.is_whitespace() { (c, Some(i)) } else { (c, None) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> StreamingFilter {
        StreamingFilter::new(StreamingConfig::default()).unwrap()
    }

    #[test]
    fn test_metadata_loop_first_occurrence_exempt() {
        let mut f = filter();
        let banner = "// File: src/main.rs";
        f.track_line(banner);
        assert!(!f.is_metadata_loop(banner));
        f.track_line(banner);
        assert!(f.is_metadata_loop(banner));
    }

    #[test]
    fn test_non_banner_lines_never_loop() {
        let mut f = filter();
        for _ in 0..3 {
            f.track_line("let x = 1;");
        }
        assert!(!f.is_metadata_loop("let x = 1;"));
    }

    #[test]
    fn test_banner_history_is_bounded() {
        let config = StreamingConfig { metadata_history: 2, ..Default::default() };
        let mut f = StreamingFilter::new(config).unwrap();
        f.track_line("# Path: a.py");
        f.track_line("# Path: b.py");
        f.track_line("# Path: c.py");
        f.track_line("# Path: a.py");
        assert!(!f.is_metadata_loop("# Path: a.py"));
    }

    #[test]
    fn test_exact_duplicate_third_occurrence() {
        let mut f = filter();
        let line = "    result.push(value);";
        assert!(!f.is_exact_duplicate(line, 0, Some("rust")));
        assert!(!f.is_exact_duplicate(line, 4, Some("rust")));
        assert!(f.is_exact_duplicate(line, 9, Some("rust")));
        assert!(f.is_exact_duplicate("result.push(value);  // again", 12, Some("rust")));
        assert_eq!(f.first_seen(line, Some("rust")), Some(0));
    }

    #[test]
    fn test_short_lines_exempt() {
        let mut f = filter();
        for i in 0..10 {
            assert!(!f.is_exact_duplicate("}", i, None));
        }
        assert_eq!(f.tracked_lines(), 0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut f = filter();
        let line = "total = total + amount";
        f.is_exact_duplicate(line, 0, None);
        f.is_exact_duplicate(line, 1, None);
        f.track_line("// File: x.js");
        f.track_line("// File: x.js");
        f.reset();
        assert!(!f.is_exact_duplicate(line, 2, None));
        assert!(!f.is_metadata_loop("// File: x.js"));
        assert_eq!(f.first_seen(line, None), Some(2));
    }

    #[test]
    fn test_block_repetition() {
        let f = filter();
        let block = "fn render(frame: &mut Frame, state: &AppState) {\n    let area = frame.size();\n    let chunks = layout_chunks(area, state.split_ratio);\n    draw_widgets(frame, chunks);\n}\n";
        assert!(!f.is_block_repetition(block));
        let doubled = format!("{block}{block}");
        assert!(f.is_block_repetition(&doubled));
    }

    #[test]
    fn test_short_blocks_not_repetition() {
        let f = filter();
        assert!(!f.is_block_repetition("a\nb\nc\na\nb\nc\n"));
    }

    #[test]
    fn test_word_repetition() {
        let f = filter();
        assert!(f.is_word_repetition(&"item ".repeat(15)));
        assert!(f.is_word_repetition(&"prefix|".repeat(15)));
        assert!(f.is_word_repetition(&format!("x = {}", "a".repeat(60))));
        assert!(!f.is_word_repetition("let values = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];"));
        // too short to judge
        assert!(!f.is_word_repetition("aaaaaaaaaa"));
    }

    #[test]
    fn test_char_run_broken_by_whitespace() {
        let f = filter();
        let spaced = "a ".repeat(40);
        let config = StreamingConfig { word_repetition_threshold: 100, ..Default::default() };
        let lenient = StreamingFilter::new(config).unwrap();
        assert!(!lenient.is_word_repetition(&spaced));
        assert!(f.is_word_repetition(&spaced));
    }

    #[test]
    fn test_invalid_config() {
        let config = StreamingConfig { max_tracked_lines: 0, ..Default::default() };
        assert!(StreamingFilter::new(config).is_err());
    }
}
