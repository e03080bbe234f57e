//! Block extraction and duplicate grouping

use super::fingerprint::CodeFingerprint;
use super::language::LanguageFamily;
use super::report::{DuplicateBlock, DuplicateKind, LineSpan};
use super::similarity::combined_similarity;
use crate::config::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Contiguous run of source lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub content: String,
    /// 0-based index of the first line
    pub start_line: usize,
    /// 0-based index of the last line, inclusive
    pub end_line: usize,
}

impl CodeBlock {
    pub fn span(&self) -> LineSpan {
        LineSpan {
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }

    /// Non-blank lines in the block
    pub fn significant_lines(&self) -> usize {
        self.content.lines().filter(|l| !l.trim().is_empty()).count()
    }

    /// Characters that are not whitespace
    pub fn significant_chars(&self) -> usize {
        self.content.chars().filter(|c| !c.is_whitespace()).count()
    }
}

fn bracket_delta(line: &str, family: LanguageFamily) -> i64 {
    family
        .strip_comments(line)
        .chars()
        .map(|c| match c {
            '{' | '(' | '[' => 1,
            '}' | ')' | ']' => -1,
            _ => 0,
        })
        .sum()
}

/// Split code into blocks.
///
/// A block ends at a blank line outside any open bracket, or at the line
/// where bracket depth returns to zero.
pub fn extract_blocks(code: &str, family: LanguageFamily) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start = 0;
    let mut depth: i64 = 0;

    let mut flush = |current: &mut Vec<&str>, start: usize, end: usize| {
        if !current.is_empty() {
            blocks.push(CodeBlock {
                content: current.join("\n"),
                start_line: start,
                end_line: end,
            });
            current.clear();
        }
    };

    for (index, line) in code.lines().enumerate() {
        if line.trim().is_empty() {
            if depth > 0 && !current.is_empty() {
                current.push(line);
            } else if !current.is_empty() {
                flush(&mut current, start, index - 1);
            }
            continue;
        }

        if current.is_empty() {
            start = index;
            depth = 0;
        }
        current.push(line);

        let before = depth;
        depth = (depth + bracket_delta(line, family)).max(0);
        if before > 0 && depth == 0 {
            flush(&mut current, start, index);
        }
    }

    let last = code.lines().count().saturating_sub(1);
    if !current.is_empty() {
        // Trailing blank lines inside an unclosed bracket are not part of the block
        while current.last().is_some_and(|l| l.trim().is_empty()) {
            current.pop();
        }
        let end = start + current.len().saturating_sub(1);
        flush(&mut current, start, end.min(last));
    }
    blocks
}

/// Compare two fingerprints, returning the match kind and similarity
pub fn classify_pair(
    first: &CodeFingerprint,
    other: &CodeFingerprint,
    config: &DetectorConfig,
) -> Option<(DuplicateKind, f64)> {
    if first.same_content(other) {
        return Some((DuplicateKind::Exact, 1.0));
    }
    let similarity = combined_similarity(first, other, &config.weights);
    if similarity >= config.similarity_threshold {
        return Some((DuplicateKind::Near, similarity));
    }
    if first.structure_hash == other.structure_hash
        && first.token_sequence.len() == other.token_sequence.len()
    {
        return Some((DuplicateKind::Structural, similarity));
    }
    None
}

/// Group blocks into duplicate sets.
///
/// Each group is anchored on its earliest block and a block joins at most
/// one group. Exact and near matches are grouped first; structural groups
/// are formed only from the blocks left over. Blocks below the configured
/// size are ignored.
pub fn group_duplicates(
    blocks: &[CodeBlock],
    fingerprints: &[Arc<CodeFingerprint>],
    config: &DetectorConfig,
) -> Vec<DuplicateBlock> {
    let eligible: Vec<usize> = (0..blocks.len())
        .filter(|&i| {
            blocks[i].significant_lines() >= config.min_block_lines
                && blocks[i].significant_chars() >= config.min_block_chars
        })
        .collect();

    let mut grouped = vec![false; blocks.len()];
    let mut groups = Vec::new();
    for structural_pass in [false, true] {
        for (pos, &anchor) in eligible.iter().enumerate() {
            if grouped[anchor] {
                continue;
            }
            let mut locations = vec![blocks[anchor].span()];
            let mut weakest = DuplicateKind::Exact;
            let mut lowest = 1.0f64;

            for &candidate in &eligible[pos + 1..] {
                if grouped[candidate] {
                    continue;
                }
                let Some((kind, similarity)) =
                    classify_pair(&fingerprints[anchor], &fingerprints[candidate], config)
                else {
                    continue;
                };
                if kind.is_removable() == structural_pass {
                    continue;
                }
                grouped[candidate] = true;
                locations.push(blocks[candidate].span());
                weakest = weakest.max(kind);
                lowest = lowest.min(similarity);
            }

            if locations.len() > 1 {
                grouped[anchor] = true;
                let block = &blocks[anchor];
                groups.push(DuplicateBlock {
                    content: block.content.clone(),
                    start_line: block.start_line,
                    end_line: block.end_line,
                    occurrences: locations.len(),
                    similarity: lowest,
                    kind: weakest,
                    locations,
                });
            }
        }
    }
    groups.sort_by_key(|g| g.start_line);
    groups
}
