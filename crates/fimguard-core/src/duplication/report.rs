//! Detection results

use serde::{Deserialize, Serialize};

/// How closely the members of a duplicate group match
///
/// Ordered from strongest to weakest; a group carries the weakest kind
/// among its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    /// Identical after normalization
    Exact,
    /// Combined similarity at or above the threshold
    Near,
    /// Same token shape with different identifiers or literals
    Structural,
}

impl DuplicateKind {
    /// Whether later occurrences of this kind are removed from output
    pub fn is_removable(&self) -> bool {
        matches!(self, Self::Exact | Self::Near)
    }
}

impl std::fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Exact => "exact",
            Self::Near => "near",
            Self::Structural => "structural",
        };
        f.write_str(name)
    }
}

/// Inclusive, 0-based line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start_line: usize,
    pub end_line: usize,
}

/// A group of blocks judged to be duplicates of one another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateBlock {
    /// Text of the first occurrence
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Number of blocks in the group, first occurrence included
    pub occurrences: usize,
    /// Lowest pairwise similarity to the first occurrence
    pub similarity: f64,
    pub kind: DuplicateKind,
    /// Every member, first occurrence first
    pub locations: Vec<LineSpan>,
}

/// A cycle of lines repeated back to back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepetitionPattern {
    /// Trimmed lines of one cycle
    pub pattern_elements: Vec<String>,
    /// Number of consecutive cycles
    pub occurrences: usize,
    pub start_line: usize,
    pub end_line: usize,
    /// Last line of the first cycle; later lines up to `end_line` are repeats
    pub first_cycle_end: usize,
    /// Span of every cycle, first cycle first
    pub cycles: Vec<LineSpan>,
}

/// Outcome of batch duplicate detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub has_duplicates: bool,
    pub duplicate_blocks: Vec<DuplicateBlock>,
    pub distributed_patterns: Vec<RepetitionPattern>,
    pub cleaned_code: String,
    pub original_line_count: usize,
    pub cleaned_line_count: usize,
    /// Block occurrences and pattern cycles removed from `cleaned_code`
    pub duplicates_removed: usize,
}

impl DuplicateReport {
    /// Report for input with nothing to remove
    pub fn clean(code: &str) -> Self {
        let lines = code.lines().count();
        Self {
            has_duplicates: false,
            duplicate_blocks: Vec::new(),
            distributed_patterns: Vec::new(),
            cleaned_code: code.to_string(),
            original_line_count: lines,
            cleaned_line_count: lines,
            duplicates_removed: 0,
        }
    }
}
