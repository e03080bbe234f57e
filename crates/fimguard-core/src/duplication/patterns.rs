//! Distributed repetition: cycles of lines repeated back to back
//!
//! Blank lines are skipped, so `A, B, <blank>, A, B, A, B` is still three
//! cycles of `A, B`. Line indices in the result refer to the original input.

use super::language::LanguageFamily;
use super::report::{LineSpan, RepetitionPattern};

struct Line<'a> {
    index: usize,
    raw: &'a str,
    key: String,
}

/// A window that is itself a repetition of a shorter cycle is not reported
/// at this length; the shorter cycle is found instead.
fn is_primitive(window: &[Line<'_>]) -> bool {
    let len = window.len();
    !(1..len)
        .filter(|period| len % period == 0)
        .any(|period| (period..len).all(|i| window[i].key == window[i % period].key))
}

fn is_significant(window: &[Line<'_>]) -> bool {
    window
        .iter()
        .any(|line| line.key.chars().any(char::is_alphanumeric))
}

/// Find back-to-back repeated cycles of `2..=max_length` lines.
///
/// At each position the cycle covering the most lines wins; ties go to the
/// shorter cycle. Scanning resumes after the matched run.
pub fn detect_patterns(
    lines: &[&str],
    family: LanguageFamily,
    min_repetitions: usize,
    max_length: usize,
) -> Vec<RepetitionPattern> {
    let items: Vec<Line<'_>> = lines
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let key = family.normalize_line(raw);
            (!key.is_empty()).then_some(Line { index, raw, key })
        })
        .collect();

    let min_repetitions = min_repetitions.max(2);
    let n = items.len();
    let mut patterns = Vec::new();
    let mut i = 0;

    while i < n {
        let mut best: Option<(usize, usize)> = None;
        for length in 2..=max_length {
            if i + length * min_repetitions > n {
                break;
            }
            let window = &items[i..i + length];
            if !is_primitive(window) || !is_significant(window) {
                continue;
            }
            let mut cycles = 1;
            while i + (cycles + 1) * length <= n
                && (0..length).all(|o| items[i + cycles * length + o].key == window[o].key)
            {
                cycles += 1;
            }
            if cycles >= min_repetitions
                && best.map_or(true, |(l, c)| cycles * length > l * c)
            {
                best = Some((length, cycles));
            }
        }

        match best {
            Some((length, cycles)) => {
                let covered = length * cycles;
                patterns.push(RepetitionPattern {
                    pattern_elements: items[i..i + length]
                        .iter()
                        .map(|line| line.raw.trim().to_string())
                        .collect(),
                    occurrences: cycles,
                    start_line: items[i].index,
                    end_line: items[i + covered - 1].index,
                    first_cycle_end: items[i + length - 1].index,
                    cycles: (0..cycles)
                        .map(|c| LineSpan {
                            start_line: items[i + c * length].index,
                            end_line: items[i + (c + 1) * length - 1].index,
                        })
                        .collect(),
                });
                i += covered;
            }
            None => i += 1,
        }
    }
    patterns
}
