//! Cleanup pattern synthesis
//!
//! Models often emit control tokens with stray spaces or missing delimiters
//! (`< | fim_prefix | >`, `|fim_prefix|>`). A [`CleanupPattern`] compiles every
//! token of a template into one case-insensitive alternation that tolerates
//! those variants for `<|X|>`, `{|X|}` and `<｜X｜>` framed tokens.
//!
//! At least one outer bracket must survive. A side missing its bracket only
//! matches when its pipes sit directly against the token name, so logical
//! operators like `a || eot || b` are never read as tokens.

use super::Template;
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// End-of-text markers honoured regardless of the active template
pub const GENERIC_END_MARKERS: &[&str] = &[
    "<|endoftext|>",
    "<|end_of_text|>",
    "<|eot_id|>",
    "<|im_end|>",
    "<|EOT|>",
    "<EOT>",
    "<｜end▁of▁sentence｜>",
];

/// Placeholder left where a token was stripped, removed again afterwards
const SENTINEL: char = '\u{0}';

lazy_static! {
    /// Empty delimiter pairs touching a stripped token
    static ref ORPHAN_DELIMITERS: Regex =
        Regex::new(r"(?:\|\||\{\s*\})?\x00(?:\|\||\{\s*\})?").unwrap();
}

/// Delimiter frames that get whitespace-tolerant matching
const FRAMES: &[(&str, &str, &str, &str, &str)] = &[
    // (open, close, open bracket regex, close bracket regex, pipe regex)
    ("<|", "|>", "<", ">", r"\|"),
    ("{|", "|}", r"\{", r"\}", r"\|"),
    ("<｜", "｜>", "<", ">", "｜"),
];

/// Build the regex source matching one control token
pub fn token_pattern(token: &str) -> String {
    let token = token.trim();
    for (open, close, open_re, close_re, pipe) in FRAMES {
        if token.len() > open.len() + close.len() && token.starts_with(open) && token.ends_with(close) {
            let inner = token[open.len()..token.len() - close.len()].trim();
            if !inner.is_empty() {
                let inner = regex::escape(inner);
                let open_full = format!(r"{open_re}\s*{pipe}*\s*");
                let close_full = format!(r"\s*{pipe}*\s*{close_re}");
                return format!(
                    r"(?:{open_full}{inner}(?:{close_full}|{pipe}+)|{pipe}+{inner}{close_full})"
                );
            }
        }
    }
    regex::escape(token)
}

fn alternation<'a, I>(tokens: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tokens: Vec<&str> = tokens
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    // Longer tokens first so a token never loses to one of its own prefixes
    tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    tokens.dedup();
    if tokens.is_empty() {
        return None;
    }
    let parts: Vec<String> = tokens.into_iter().map(token_pattern).collect();
    Some(format!("(?:{})", parts.join("|")))
}

/// Compiled matcher for one template's control tokens
#[derive(Debug, Clone)]
pub struct CleanupPattern {
    template_id: String,
    strip: Option<Regex>,
    terminator: Option<Regex>,
    literals: Vec<String>,
    end_markers: Vec<String>,
}

impl CleanupPattern {
    /// Compile the strip and truncation patterns for a template
    pub fn compile(template: &Template) -> Result<Self, regex::Error> {
        let tokens = template.tokens();
        let strip = match alternation(tokens.iter().copied()) {
            Some(source) => Some(RegexBuilder::new(&source).case_insensitive(true).build()?),
            None => None,
        };

        let end_markers = end_markers(template);
        let terminator = match alternation(end_markers.iter().map(String::as_str)) {
            Some(source) => Some(RegexBuilder::new(&source).case_insensitive(true).build()?),
            None => None,
        };

        debug!(
            template = %template.id,
            tokens = tokens.len(),
            end_markers = end_markers.len(),
            "Compiled cleanup pattern"
        );

        Ok(Self {
            template_id: template.id.clone(),
            strip,
            terminator,
            literals: tokens.iter().map(|t| t.trim().to_string()).collect(),
            end_markers,
        })
    }

    /// Exact-match fallback used when a pattern cannot be compiled
    pub fn literal(template: &Template) -> Self {
        Self {
            template_id: template.id.clone(),
            strip: None,
            terminator: None,
            literals: template.tokens().iter().map(|t| t.trim().to_string()).collect(),
            end_markers: end_markers(template),
        }
    }

    /// Template this pattern was compiled from
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// Whether `text` contains any control token
    pub fn is_match(&self, text: &str) -> bool {
        match &self.strip {
            Some(strip) => strip.is_match(text),
            None => self.literals.iter().any(|t| text.contains(t.as_str())),
        }
    }

    /// Cut `text` at the first end-of-text marker
    pub fn truncate<'t>(&self, text: &'t str) -> &'t str {
        let cut = match &self.terminator {
            Some(terminator) => terminator.find(text).map(|m| m.start()),
            None => self
                .end_markers
                .iter()
                .filter_map(|marker| text.find(marker.as_str()))
                .min(),
        };
        match cut {
            Some(pos) => &text[..pos],
            None => text,
        }
    }

    /// Remove every control token, plus empty delimiter pairs left next to them
    pub fn strip(&self, text: &str) -> String {
        let Some(strip) = &self.strip else {
            let mut out = text.to_string();
            for literal in &self.literals {
                out = out.replace(literal.as_str(), "");
            }
            return out;
        };

        if text.contains(SENTINEL) {
            return strip.replace_all(text, "").into_owned();
        }
        let marked = strip.replace_all(text, SENTINEL.to_string().as_str());
        ORPHAN_DELIMITERS.replace_all(&marked, "").into_owned()
    }
}

fn end_markers(template: &Template) -> Vec<String> {
    let mut markers: Vec<String> = template
        .eot
        .iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    for marker in GENERIC_END_MARKERS {
        if !markers.iter().any(|m| m == marker) {
            markers.push(marker.to_string());
        }
    }
    markers
}
