//! Per-request stop detection for streamed generations
//!
//! The detector counts tokens and lines as they are emitted and scans the
//! accumulated text for stop sequences or repeated file banners. It only
//! reports a verdict; halting token production is up to the caller.

use crate::config::StopConfig;
use crate::template::Template;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Occurrences of a banner line that indicate a metadata loop
pub const METADATA_REPEAT_LIMIT: usize = 3;

/// Line-leading `File:` / `Path:` banner, optionally behind a comment marker
pub(crate) const BANNER_PATTERN: &str =
    r"^[ \t]*(?://+|#+|--|/\*+|\*|<!--)?[ \t]*(?:file|path|filename|filepath)[ \t]*:";

lazy_static! {
    static ref METADATA_BANNER: Regex = Regex::new(&format!("(?mi){}", BANNER_PATTERN)).unwrap();
}

/// Token and line counters for one generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationCounters {
    pub tokens: usize,
    pub lines: usize,
}

impl GenerationCounters {
    /// Account for one emitted token
    pub fn record(&mut self, token: &str) {
        self.tokens += 1;
        self.lines += memchr::memchr_iter(b'\n', token.as_bytes()).count();
    }
}

/// Read-only snapshot of detector counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopStats {
    pub tokens: usize,
    pub lines: usize,
}

/// Which condition ended a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxTokens,
    MaxLines,
    StopSequence,
    MetadataLoop,
}

/// Counts emitted tokens and lines and checks stop conditions
#[derive(Debug, Clone)]
pub struct StopDetector {
    max_tokens: usize,
    max_lines: usize,
    stop_sequences: Vec<String>,
    counters: GenerationCounters,
}

impl StopDetector {
    /// Create a detector from explicit limits
    pub fn new(config: &StopConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_tokens: config.max_tokens,
            max_lines: config.max_lines,
            stop_sequences: config.stop_sequences.clone(),
            counters: GenerationCounters::default(),
        })
    }

    /// Create a detector whose stop sequences also include the template's
    /// end, separator and region tokens.
    pub fn for_template(template: &Template, config: &StopConfig) -> Result<Self> {
        let mut detector = Self::new(config)?;
        if config.derive_template_stops {
            for token in template.stop_tokens() {
                if !detector.stop_sequences.contains(&token) {
                    detector.stop_sequences.push(token);
                }
            }
        }
        Ok(detector)
    }

    /// Zero the counters before a new generation
    pub fn reset(&mut self) {
        self.counters = GenerationCounters::default();
    }

    /// Record one emitted token
    pub fn track_token(&mut self, token: &str) {
        self.counters.record(token);
    }

    pub fn is_max_tokens_reached(&self) -> bool {
        self.counters.tokens >= self.max_tokens
    }

    pub fn is_max_lines_reached(&self) -> bool {
        self.counters.lines >= self.max_lines
    }

    /// Whether `text` contains any configured stop sequence
    pub fn has_stop_sequence(&self, text: &str) -> bool {
        self.stop_sequences
            .iter()
            .any(|seq| memchr::memmem::find(text.as_bytes(), seq.as_bytes()).is_some())
    }

    /// Byte offset of the earliest stop sequence in `text`
    pub fn first_stop_sequence(&self, text: &str) -> Option<usize> {
        self.stop_sequences
            .iter()
            .filter_map(|seq| memchr::memmem::find(text.as_bytes(), seq.as_bytes()))
            .min()
    }

    /// Whether file/path banners repeat often enough to indicate a loop
    pub fn is_metadata_repeating(&self, text: &str) -> bool {
        METADATA_BANNER.find_iter(text).take(METADATA_REPEAT_LIMIT).count() >= METADATA_REPEAT_LIMIT
    }

    /// First stop condition that holds, checked in a fixed order
    pub fn stop_reason(&self, text: &str) -> Option<StopReason> {
        let reason = if self.is_max_tokens_reached() {
            Some(StopReason::MaxTokens)
        } else if self.is_max_lines_reached() {
            Some(StopReason::MaxLines)
        } else if self.has_stop_sequence(text) {
            Some(StopReason::StopSequence)
        } else if self.is_metadata_repeating(text) {
            Some(StopReason::MetadataLoop)
        } else {
            None
        };
        if let Some(reason) = reason {
            trace!(?reason, tokens = self.counters.tokens, lines = self.counters.lines, "Stop condition met");
        }
        reason
    }

    pub fn should_stop(&self, text: &str) -> bool {
        self.stop_reason(text).is_some()
    }

    pub fn get_stats(&self) -> StopStats {
        StopStats {
            tokens: self.counters.tokens,
            lines: self.counters.lines,
        }
    }

    /// Snapshot of the raw counters
    pub fn counters(&self) -> GenerationCounters {
        self.counters
    }

    pub fn stop_sequences(&self) -> &[String] {
        &self.stop_sequences
    }
}
