//! Fill-in-the-middle prompt templates
//!
//! Each model family marks the prefix, suffix and middle regions of a FIM
//! prompt with its own control tokens. A [`Template`] records those tokens,
//! a [`TemplateRegistry`] maps identifiers to templates, and the
//! [`TemplateCodec`] builds prompts and strips the tokens back out of
//! model output.

pub mod codec;
pub mod pattern;

pub use codec::TemplateCodec;
pub use pattern::CleanupPattern;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Identifier of the fallback template
pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// Identifier that overlays caller-supplied tokens onto the default template
pub const CUSTOM_TEMPLATE_ID: &str = "custom";

/// Control tokens used by one model family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub prefix: String,
    pub suffix: String,
    pub middle: String,
    pub eot: Option<String>,
    pub file_separator: Option<String>,
    #[serde(default)]
    pub extra_stop_tokens: Vec<String>,
}

impl Template {
    /// Create a template with the three region markers
    pub fn new(
        id: impl Into<String>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        middle: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
            middle: middle.into(),
            eot: None,
            file_separator: None,
            extra_stop_tokens: Vec::new(),
        }
    }

    /// Set the end-of-text token
    pub fn with_eot(mut self, eot: impl Into<String>) -> Self {
        self.eot = Some(eot.into());
        self
    }

    /// Set the file separator token
    pub fn with_file_separator(mut self, separator: impl Into<String>) -> Self {
        self.file_separator = Some(separator.into());
        self
    }

    /// Append extra stop tokens
    pub fn with_extra_stops<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_stop_tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    /// Every non-empty control token of this template
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens = vec![self.prefix.as_str(), self.suffix.as_str(), self.middle.as_str()];
        tokens.extend(self.eot.as_deref());
        tokens.extend(self.file_separator.as_deref());
        tokens.extend(self.extra_stop_tokens.iter().map(String::as_str));
        tokens.retain(|t| !t.trim().is_empty());
        tokens
    }

    /// Tokens that end a middle completion when they appear in output
    pub fn stop_tokens(&self) -> Vec<String> {
        let mut stops: Vec<String> = Vec::new();
        let candidates = self
            .eot
            .iter()
            .chain(self.file_separator.iter())
            .chain(self.extra_stop_tokens.iter())
            .chain([&self.prefix, &self.suffix]);
        for token in candidates {
            let token = token.trim();
            if !token.is_empty() && !stops.iter().any(|s| s == token) {
                stops.push(token.to_string());
            }
        }
        stops
    }

    fn apply(mut self, custom: &CustomTokens) -> Self {
        self.id = CUSTOM_TEMPLATE_ID.to_string();
        if let Some(prefix) = &custom.prefix {
            self.prefix = prefix.clone();
        }
        if let Some(suffix) = &custom.suffix {
            self.suffix = suffix.clone();
        }
        if let Some(middle) = &custom.middle {
            self.middle = middle.clone();
        }
        if custom.eot.is_some() {
            self.eot = custom.eot.clone();
        }
        if custom.file_separator.is_some() {
            self.file_separator = custom.file_separator.clone();
        }
        if let Some(extra) = &custom.extra_stop_tokens {
            self.extra_stop_tokens = extra.clone();
        }
        self
    }
}

/// Caller-supplied token overrides for the `custom` template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomTokens {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub middle: Option<String>,
    pub eot: Option<String>,
    pub file_separator: Option<String>,
    pub extra_stop_tokens: Option<Vec<String>>,
}

/// Lookup table from template id to immutable template record
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<Template>>,
}

impl TemplateRegistry {
    /// Registry holding only the default template
    pub fn empty() -> Self {
        let mut templates = HashMap::new();
        templates.insert(DEFAULT_TEMPLATE_ID.to_string(), Arc::new(default_template()));
        Self { templates }
    }

    /// Registry with every built-in model family
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for template in builtin_templates() {
            registry = registry.with_template(template);
        }
        registry
    }

    /// Register (or replace) a template
    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.insert(template.id.clone(), Arc::new(template));
        self
    }

    /// Look up a template, falling back to `default` for unknown ids
    pub fn lookup(&self, id: &str) -> Arc<Template> {
        self.templates
            .get(id)
            .or_else(|| self.templates.get(DEFAULT_TEMPLATE_ID))
            .cloned()
            .unwrap_or_else(|| Arc::new(default_template()))
    }

    /// Resolve an id (and custom overrides) into a concrete template
    pub fn resolve(&self, id: &str, custom: Option<&CustomTokens>) -> Arc<Template> {
        if id == CUSTOM_TEMPLATE_ID {
            let base = self.lookup(DEFAULT_TEMPLATE_ID);
            let overrides = custom.cloned().unwrap_or_default();
            return Arc::new((*base).clone().apply(&overrides));
        }
        self.lookup(id)
    }

    /// Whether an id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Sorted list of registered ids
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.templates.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn default_template() -> Template {
    Template::new(DEFAULT_TEMPLATE_ID, "<|fim_prefix|>", "<|fim_suffix|>", "<|fim_middle|>")
        .with_eot("<|endoftext|>")
        .with_file_separator("<|file_sep|>")
        .with_extra_stops(["<|fim_pad|>", "<|repo_name|>"])
}

fn builtin_templates() -> Vec<Template> {
    vec![
        Template::new("qwen", "<|fim_prefix|>", "<|fim_suffix|>", "<|fim_middle|>")
            .with_eot("<|endoftext|>")
            .with_file_separator("<|file_sep|>")
            .with_extra_stops(["<|fim_pad|>", "<|repo_name|>", "<|im_start|>", "<|im_end|>"]),
        Template::new("starcoder", "<fim_prefix>", "<fim_suffix>", "<fim_middle>")
            .with_eot("<|endoftext|>")
            .with_file_separator("<file_sep>")
            .with_extra_stops(["<fim_pad>", "<filename>", "<reponame>", "<gh_stars>"]),
        Template::new("codellama", "<PRE> ", " <SUF>", " <MID>").with_eot("<EOT>"),
        Template::new("deepseek", "<｜fim▁begin｜>", "<｜fim▁hole｜>", "<｜fim▁end｜>")
            .with_eot("<｜end▁of▁sentence｜>"),
        Template::new("codegemma", "<|fim_prefix|>", "<|fim_suffix|>", "<|fim_middle|>")
            .with_eot("<|file_separator|>")
            .with_extra_stops(["<end_of_turn>"]),
    ]
}
