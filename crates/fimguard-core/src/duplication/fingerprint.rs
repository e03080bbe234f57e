//! Code fingerprints
//!
//! A fingerprint condenses a code block into hashes that are cheap to
//! compare: an exact content hash over normalized text, a 64-bit SimHash
//! over the token sequence for near matches, and a structure hash over the
//! token sequence with identifiers and literals abstracted away.

use super::language::LanguageFamily;
use lazy_static::lazy_static;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;
use unicode_normalization::UnicodeNormalization;
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

lazy_static! {
    static ref TOKEN_PATTERN: Regex = Regex::new(concat!(
        r"[\p{L}_$][\p{L}\p{N}_$]*",
        r"|\d+(?:\.\d+)?",
        r#"|"(?:[^"\\\n]|\\.)*""#,
        r"|'(?:[^'\\\n]|\\.)*'",
        r"|`(?:[^`\\]|\\.)*`",
        r"|==|!=|<=|>=|&&|\|\||=>|->|::|\+\+|--|\+=|-=|\*=|/=",
        r"|[^\s\w]",
    ))
    .unwrap();
}

/// Lexical class of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Number,
    String,
    Operator,
}

/// Classify a token produced by [`tokenize`]
pub fn classify(token: &str, family: LanguageFamily) -> TokenKind {
    let Some(first) = token.chars().next() else {
        return TokenKind::Operator;
    };
    if first.is_alphabetic() || first == '_' || first == '$' {
        if family.is_keyword(token) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        }
    } else if first.is_ascii_digit() {
        TokenKind::Number
    } else if matches!(first, '"' | '\'' | '`') && token.len() > 1 {
        TokenKind::String
    } else {
        TokenKind::Operator
    }
}

/// Strip comments, apply NFC and collapse whitespace; blank lines are dropped
pub fn normalize(code: &str, family: LanguageFamily) -> String {
    let composed: String = code.nfc().collect();
    family
        .strip_comments(&composed)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split normalized code into identifiers, literals, keywords and operators
pub fn tokenize(normalized: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(normalized)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 64-bit SimHash: every token votes on every bit with its own hash
pub fn simhash<S: AsRef<str>>(tokens: &[S]) -> u64 {
    if tokens.is_empty() {
        return 0;
    }
    let mut weights = [0i64; 64];
    for token in tokens {
        let hash = xxh3_64(token.as_ref().as_bytes());
        for (bit, weight) in weights.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }
    weights
        .iter()
        .enumerate()
        .filter(|(_, &w)| w > 0)
        .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit))
}

fn structure_hash(tokens: &[String], family: LanguageFamily) -> u64 {
    let mut hasher = Xxh3::new();
    for token in tokens {
        let shape = match classify(token, family) {
            TokenKind::Identifier => "$id",
            TokenKind::Number => "$num",
            TokenKind::String => "$str",
            TokenKind::Keyword | TokenKind::Operator => token.as_str(),
        };
        hasher.update(shape.as_bytes());
        hasher.update(&[0x1f]);
    }
    hasher.digest()
}

/// Hashes and token data derived from one code block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFingerprint {
    /// xxh3 of the normalized text
    pub content_hash: u64,
    /// SimHash of the token sequence
    pub similarity_hash: u64,
    /// Hash of the token sequence with identifiers and literals abstracted
    pub structure_hash: u64,
    pub token_sequence: Vec<String>,
    pub normalized_text: String,
    pub line_count: usize,
    pub char_count: usize,
}

impl CodeFingerprint {
    /// Compute a fingerprint without consulting any cache
    pub fn compute(code: &str, family: LanguageFamily) -> Self {
        let normalized_text = normalize(code, family);
        let token_sequence = tokenize(&normalized_text);
        Self {
            content_hash: xxh3_64(normalized_text.as_bytes()),
            similarity_hash: simhash(&token_sequence),
            structure_hash: structure_hash(&token_sequence, family),
            line_count: code.lines().count(),
            char_count: code.chars().count(),
            token_sequence,
            normalized_text,
        }
    }

    /// Same normalized content
    pub fn same_content(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash && self.normalized_text == other.normalized_text
    }
}

/// Fingerprint cache size snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
}

/// Capacity-bounded fingerprint cache; the least recently used entry is
/// evicted once `max_size` is reached.
pub struct FingerprintCache {
    entries: Mutex<LruCache<(LanguageFamily, String), Arc<CodeFingerprint>>>,
    max_size: NonZeroUsize,
}

impl FingerprintCache {
    pub fn new(max_size: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(max_size)),
            max_size,
        }
    }

    /// Return the cached fingerprint or compute and insert it
    pub fn get_or_compute(&self, code: &str, family: LanguageFamily) -> Arc<CodeFingerprint> {
        let key = (family, code.to_string());
        if let Some(hit) = self.entries.lock().get(&key) {
            trace!(chars = code.len(), "Fingerprint cache hit");
            return Arc::clone(hit);
        }
        let fingerprint = Arc::new(CodeFingerprint::compute(code, family));
        self.entries.lock().put(key, Arc::clone(&fingerprint));
        fingerprint
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.lock().len(),
            max_size: self.max_size.get(),
        }
    }
}

impl std::fmt::Debug for FingerprintCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintCache")
            .field("stats", &self.stats())
            .finish()
    }
}
