//! Completion pipeline tying the components together
//!
//! A [`CompletionPipeline`] is long lived and holds the template codec and
//! the batch detector. Every generation gets its own [`GenerationGuard`] with
//! fresh stop counters and streaming state, so nothing leaks between
//! requests.

use crate::config::{PipelineConfig, StopConfig, StreamingConfig};
use crate::duplication::{DuplicateReport, DuplicationDetector};
use crate::stop::{StopDetector, StopReason, StopStats};
use crate::streaming::StreamingFilter;
use crate::template::{CustomTokens, TemplateCodec, TemplateRegistry};
use crate::{CoreError, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Reason a generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The token stream ran out
    EndOfStream,
    /// Reached `max_tokens`
    MaxTokens,
    /// Reached `max_lines`
    MaxLines,
    /// Hit a stop sequence or end-of-text token
    StopSequence,
    /// File/path banners started repeating
    MetadataLoop,
    /// Lines, blocks, words or characters started repeating
    Repetition,
}

impl From<StopReason> for FinishReason {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::MaxTokens => Self::MaxTokens,
            StopReason::MaxLines => Self::MaxLines,
            StopReason::StopSequence => Self::StopSequence,
            StopReason::MetadataLoop => Self::MetadataLoop,
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EndOfStream => "end_of_stream",
            Self::MaxTokens => "max_tokens",
            Self::MaxLines => "max_lines",
            Self::StopSequence => "stop_sequence",
            Self::MetadataLoop => "metadata_loop",
            Self::Repetition => "repetition",
        };
        f.write_str(name)
    }
}

/// Final text of a completion with its duplicate report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutput {
    /// Cleaned, deduplicated completion text
    pub text: String,
    pub report: DuplicateReport,
    /// Set when the output came from a streamed generation
    pub request_id: Option<String>,
    pub finish_reason: Option<FinishReason>,
    pub stats: Option<StopStats>,
    /// Wall time of the streamed generation in milliseconds
    pub total_time_ms: Option<f64>,
}

/// Per-request guard fed one token at a time.
///
/// Stop conditions are checked after every token; line-based repetition
/// checks run whenever a line completes. Once a finish reason is returned
/// the guard stays finished and ignores further tokens.
#[derive(Debug)]
pub struct GenerationGuard {
    request_id: Uuid,
    language: Option<String>,
    stop: StopDetector,
    filter: StreamingFilter,
    text: String,
    line_start: usize,
    lines_seen: usize,
    finish: Option<FinishReason>,
}

impl GenerationGuard {
    fn new(stop: StopDetector, filter: StreamingFilter, language: Option<&str>) -> Self {
        let request_id = Uuid::new_v4();
        debug!(%request_id, language, "Starting generation");
        Self {
            request_id,
            language: language.map(str::to_string),
            stop,
            filter,
            text: String::new(),
            line_start: 0,
            lines_seen: 0,
            finish: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Feed one token; returns the finish reason once generation should end
    pub fn push_token(&mut self, token: &str) -> Option<FinishReason> {
        if self.finish.is_some() {
            return self.finish;
        }

        self.stop.track_token(token);
        self.text.push_str(token);
        if let Some(reason) = self.stop.stop_reason(&self.text) {
            return self.finish_with(reason.into());
        }

        while let Some(offset) = memchr::memchr(b'\n', &self.text.as_bytes()[self.line_start..]) {
            let end = self.line_start + offset;
            let line = self.text[self.line_start..end].to_string();
            self.line_start = end + 1;
            let index = self.lines_seen;
            self.lines_seen += 1;
            if let Some(reason) = self.check_line(&line, index) {
                return self.finish_with(reason);
            }
        }

        if self.filter.is_word_repetition(&self.text) {
            return self.finish_with(FinishReason::Repetition);
        }
        None
    }

    fn check_line(&mut self, line: &str, index: usize) -> Option<FinishReason> {
        self.filter.track_line(line);
        if self.filter.is_metadata_loop(line) {
            return Some(FinishReason::MetadataLoop);
        }
        if self.filter.is_exact_duplicate(line, index, self.language.as_deref()) {
            return Some(FinishReason::Repetition);
        }
        if self.filter.is_block_repetition(&self.text[..self.line_start]) {
            return Some(FinishReason::Repetition);
        }
        None
    }

    fn finish_with(&mut self, reason: FinishReason) -> Option<FinishReason> {
        let stats = self.stop.get_stats();
        debug!(
            request_id = %self.request_id,
            %reason,
            tokens = stats.tokens,
            lines = stats.lines,
            "Generation finished early"
        );
        self.finish = Some(reason);
        self.finish
    }

    /// Finish reason, if generation has ended early
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish
    }

    /// Raw accumulated text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Accumulated text cut at the first stop sequence
    pub fn final_text(&self) -> &str {
        match self.stop.first_stop_sequence(&self.text) {
            Some(pos) => &self.text[..pos],
            None => &self.text,
        }
    }

    pub fn stats(&self) -> StopStats {
        self.stop.get_stats()
    }
}

/// Prompt building, streaming guards and final cleanup for one template
#[derive(Debug)]
pub struct CompletionPipeline {
    codec: TemplateCodec,
    detector: DuplicationDetector,
    stop_config: StopConfig,
    streaming_config: StreamingConfig,
}

impl CompletionPipeline {
    /// Build a pipeline against the built-in template registry
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_registry(config, Arc::new(TemplateRegistry::builtin()))
    }

    /// Build a pipeline against a caller-supplied template registry
    pub fn with_registry(config: PipelineConfig, registry: Arc<TemplateRegistry>) -> Result<Self> {
        config.validate()?;
        let codec = TemplateCodec::with_template(registry, &config.template.id, config.template.custom.as_ref());
        let detector = DuplicationDetector::new(config.detector)?;
        info!(template = %codec.template().id, "Completion pipeline ready");
        Ok(Self {
            codec,
            detector,
            stop_config: config.stop,
            streaming_config: config.streaming,
        })
    }

    pub fn codec(&self) -> &TemplateCodec {
        &self.codec
    }

    pub fn detector(&self) -> &DuplicationDetector {
        &self.detector
    }

    /// Switch the active template
    pub fn select_template(&mut self, id: &str, custom: Option<&CustomTokens>) {
        self.codec.select_template(id, custom);
    }

    pub fn build_prompt(&self, prefix: &str, suffix: &str) -> String {
        self.codec.build_prompt(prefix, suffix)
    }

    /// Fresh per-request guard for the active template
    pub fn start_generation(&self, language: Option<&str>) -> Result<GenerationGuard> {
        let stop = StopDetector::for_template(self.codec.template(), &self.stop_config)?;
        let filter = StreamingFilter::new(self.streaming_config.clone())?;
        Ok(GenerationGuard::new(stop, filter, language))
    }

    /// Strip control tokens, then remove duplicated content
    pub fn finalize(&self, raw: &str, language: Option<&str>) -> CompletionOutput {
        let cleaned = self.codec.clean_output(raw);
        let report = self.detector.detect_duplicates(&cleaned, language);
        CompletionOutput {
            text: report.cleaned_code.clone(),
            report,
            request_id: None,
            finish_reason: None,
            stats: None,
            total_time_ms: None,
        }
    }

    /// Drive a token stream through a fresh guard, stopping early when the
    /// guard says so, and finalize the collected text.
    pub async fn generate<S, T, E>(&self, stream: S, language: Option<&str>) -> Result<CompletionOutput>
    where
        S: Stream<Item = std::result::Result<T, E>>,
        T: AsRef<str>,
        E: std::fmt::Display,
    {
        let start_time = Instant::now();
        let mut guard = self.start_generation(language)?;
        let mut stream = std::pin::pin!(stream);

        let mut finish_reason = FinishReason::EndOfStream;
        while let Some(item) = stream.next().await {
            let token = item.map_err(|e| CoreError::Generation {
                code: "TOKEN_STREAM_FAILED",
                message: format!("Token stream failed: {}", e),
                context: format!("After {} tokens", guard.stats().tokens),
                suggestion: "Check the model runtime producing the stream".to_string(),
                request_id: Some(guard.request_id().to_string()),
            })?;
            trace!(request_id = %guard.request_id(), token = token.as_ref(), "Token");
            if let Some(reason) = guard.push_token(token.as_ref()) {
                finish_reason = reason;
                break;
            }
        }

        let mut output = self.finalize(guard.final_text(), language);
        let total_time_ms = start_time.elapsed().as_secs_f64() * 1000.0;
        info!(
            request_id = %guard.request_id(),
            %finish_reason,
            tokens = guard.stats().tokens,
            duplicates_removed = output.report.duplicates_removed,
            total_time_ms,
            "Generation complete"
        );
        output.request_id = Some(guard.request_id().to_string());
        output.finish_reason = Some(finish_reason);
        output.stats = Some(guard.stats());
        output.total_time_ms = Some(total_time_ms);
        Ok(output)
    }
}

impl Default for CompletionPipeline {
    fn default() -> Self {
        Self {
            codec: TemplateCodec::default(),
            detector: DuplicationDetector::default(),
            stop_config: StopConfig::default(),
            streaming_config: StreamingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn guard() -> GenerationGuard {
        CompletionPipeline::default().start_generation(Some("rust")).unwrap()
    }

    #[test]
    fn test_guard_stops_on_end_of_text() {
        let mut g = guard();
        assert_eq!(g.push_token("let x = 1;"), None);
        assert_eq!(g.push_token("<|endoftext|>"), Some(FinishReason::StopSequence));
        assert_eq!(g.final_text(), "let x = 1;");
        // finished guards stay finished
        assert_eq!(g.push_token("more"), Some(FinishReason::StopSequence));
        assert_eq!(g.stats().tokens, 2);
    }

    #[test]
    fn test_guard_stops_on_repeated_line() {
        let mut g = guard();
        let line = "    counter.increment();\n";
        assert_eq!(g.push_token(line), None);
        assert_eq!(g.push_token(line), None);
        assert_eq!(g.push_token(line), Some(FinishReason::Repetition));
    }

    #[test]
    fn test_guard_stops_on_banner_loop() {
        let mut g = guard();
        assert_eq!(g.push_token("// File: src/lib.rs\n"), None);
        assert_eq!(g.push_token("pub mod a;\n"), None);
        assert_eq!(g.push_token("// File: src/lib.rs\n"), Some(FinishReason::MetadataLoop));
    }

    #[test]
    fn test_guards_do_not_share_state() {
        let pipeline = CompletionPipeline::default();
        let line = "    counter.increment();\n";
        let mut first = pipeline.start_generation(None).unwrap();
        first.push_token(line);
        first.push_token(line);

        let mut second = pipeline.start_generation(None).unwrap();
        assert_ne!(first.request_id(), second.request_id());
        assert_eq!(second.push_token(line), None);
        assert_eq!(second.stats().tokens, 1);
    }

    #[test]
    fn test_finalize_cleans_and_dedups() {
        let pipeline = CompletionPipeline::default();
        let raw = "<|fim_middle|>function foo() {\n  return 1;\n}\nfunction foo() {\n  return 1;\n}\n<|endoftext|>extra";
        let output = pipeline.finalize(raw, Some("javascript"));
        assert_eq!(output.text, "function foo() {\n  return 1;\n}\n");
        assert!(output.report.has_duplicates);
        assert!(output.finish_reason.is_none());
    }

    #[tokio::test]
    async fn test_generate_until_end_of_stream() {
        let pipeline = CompletionPipeline::default();
        let tokens = vec!["fn ", "main() {\n", "    run();\n", "}\n"];
        let stream = stream::iter(tokens.into_iter().map(Ok::<_, std::io::Error>));
        let output = pipeline.generate(stream, Some("rust")).await.unwrap();
        assert_eq!(output.text, "fn main() {\n    run();\n}\n");
        assert_eq!(output.finish_reason, Some(FinishReason::EndOfStream));
        assert_eq!(output.stats, Some(StopStats { tokens: 4, lines: 3 }));
    }

    #[tokio::test]
    async fn test_generate_propagates_stream_errors() {
        let pipeline = CompletionPipeline::default();
        let items: Vec<std::result::Result<&str, String>> = vec![Ok("a"), Err("connection reset".to_string())];
        let err = pipeline.generate(stream::iter(items), None).await.unwrap_err();
        assert_eq!(err.code(), "TOKEN_STREAM_FAILED");
    }
}
