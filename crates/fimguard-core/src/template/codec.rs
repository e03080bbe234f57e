//! Template codec: prompt building and output cleanup

use super::{CleanupPattern, CustomTokens, Template, TemplateRegistry, DEFAULT_TEMPLATE_ID};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Builds FIM prompts for the active template and strips its control tokens
/// from completions.
#[derive(Debug, Clone)]
pub struct TemplateCodec {
    registry: Arc<TemplateRegistry>,
    active: Arc<Template>,
    pattern: CleanupPattern,
}

impl TemplateCodec {
    /// Create a codec with the registry's default template active
    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        let active = registry.lookup(DEFAULT_TEMPLATE_ID);
        let pattern = compile_pattern(&active);
        Self { registry, active, pattern }
    }

    /// Create a codec with a specific template active
    pub fn with_template(registry: Arc<TemplateRegistry>, id: &str, custom: Option<&CustomTokens>) -> Self {
        let mut codec = Self::new(registry);
        codec.select_template(id, custom);
        codec
    }

    /// Switch the active template.
    ///
    /// Unknown ids fall back to `default`. `custom` overlays the given tokens
    /// onto the default template. Selecting a template identical to the active
    /// one keeps the compiled pattern.
    pub fn select_template(&mut self, id: &str, custom: Option<&CustomTokens>) {
        if !self.registry.contains(id) && id != super::CUSTOM_TEMPLATE_ID {
            debug!(requested = id, "Unknown template id, using default");
        }
        let resolved = self.registry.resolve(id, custom);
        if *resolved == *self.active {
            trace!(template = %resolved.id, "Template unchanged");
            return;
        }
        self.pattern = compile_pattern(&resolved);
        debug!(from = %self.active.id, to = %resolved.id, "Switched template");
        self.active = resolved;
    }

    /// Currently active template
    pub fn template(&self) -> &Template {
        &self.active
    }

    /// Compiled cleanup pattern for the active template
    pub fn pattern(&self) -> &CleanupPattern {
        &self.pattern
    }

    /// Registry the codec resolves ids against
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Assemble `prefix_token + prefix + suffix_token + suffix + middle_token`.
    ///
    /// Context text is inserted verbatim; when it already contains control
    /// tokens a warning is logged and the prompt is still built unchanged.
    pub fn build_prompt(&self, prefix: &str, suffix: &str) -> String {
        if self.contains_control_token(prefix) || self.contains_control_token(suffix) {
            warn!(template = %self.active.id, "Prompt context contains control tokens");
        }
        let t = &self.active;
        let mut prompt = String::with_capacity(
            t.prefix.len() + prefix.len() + t.suffix.len() + suffix.len() + t.middle.len(),
        );
        prompt.push_str(&t.prefix);
        prompt.push_str(prefix);
        prompt.push_str(&t.suffix);
        prompt.push_str(suffix);
        prompt.push_str(&t.middle);
        prompt
    }

    /// Whether `text` contains a control token of the active template
    pub fn contains_control_token(&self, text: &str) -> bool {
        !text.is_empty() && self.pattern.is_match(text)
    }

    /// Strip control tokens and end-of-text tails from a completion.
    ///
    /// Text after the first end-of-text marker is discarded, every control
    /// token is removed, and empty `||` / `{}` pairs left touching a removed
    /// token are dropped.
    pub fn clean_output(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let head = self.pattern.truncate(text);
        let stripped = self.pattern.strip(head);
        let cleaned = self.pattern.truncate(&stripped).to_string();
        if cleaned.len() != text.len() {
            trace!(before = text.len(), after = cleaned.len(), "Cleaned completion output");
        }
        cleaned
    }
}

impl Default for TemplateCodec {
    fn default() -> Self {
        Self::new(Arc::new(TemplateRegistry::builtin()))
    }
}

fn compile_pattern(template: &Template) -> CleanupPattern {
    match CleanupPattern::compile(template) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!(template = %template.id, error = %e, "Falling back to literal token cleanup");
            CleanupPattern::literal(template)
        }
    }
}
