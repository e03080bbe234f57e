//! Configuration for the completion pipeline

use crate::template::CustomTokens;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;

/// Main configuration for the completion pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Active prompt template
    pub template: TemplateConfig,

    /// Stop detector limits
    pub stop: StopConfig,

    /// Streaming duplication filter thresholds
    pub streaming: StreamingConfig,

    /// Batch duplication detector settings
    pub detector: DetectorConfig,
}

/// Template selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Template identifier, looked up in the registry
    pub id: String,

    /// Token overrides applied when `id` is `custom`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomTokens>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            custom: None,
        }
    }
}

/// Stop detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// Maximum number of tokens per generation
    pub max_tokens: usize,

    /// Maximum number of generated lines
    pub max_lines: usize,

    /// Literal stop sequences
    pub stop_sequences: Vec<String>,

    /// Add the active template's end/separator tokens to the stop sequences
    pub derive_template_stops: bool,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            max_lines: 64,
            stop_sequences: Vec::new(),
            derive_template_stops: true,
        }
    }
}

impl StopConfig {
    /// Validate stop limits
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(CoreError::invalid_field(
                "STOP_MAX_TOKENS_ZERO",
                "max_tokens",
                "max_tokens must be greater than 0",
                "Stop detector configuration",
                "Use a positive token limit",
            ));
        }
        if self.max_lines == 0 {
            return Err(CoreError::invalid_field(
                "STOP_MAX_LINES_ZERO",
                "max_lines",
                "max_lines must be greater than 0",
                "Stop detector configuration",
                "Use a positive line limit",
            ));
        }
        if self.stop_sequences.iter().any(|s| s.is_empty()) {
            return Err(CoreError::invalid_field(
                "STOP_SEQUENCE_EMPTY",
                "stop_sequences",
                "Stop sequences must not be empty strings",
                "An empty stop sequence matches every text",
                "Remove empty entries from stop_sequences",
            ));
        }
        Ok(())
    }
}

/// Streaming duplication filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Lines shorter than this (after normalization) are never duplicates
    pub min_line_length: usize,

    /// Occurrences of a line tolerated before it counts as a duplicate
    pub max_line_occurrences: usize,

    /// Capacity of the per-line occurrence map
    pub max_tracked_lines: usize,

    /// Number of distinct banner lines remembered for loop detection
    pub metadata_history: usize,

    /// Minimum lines in a repeated block
    pub block_min_lines: usize,

    /// Minimum characters in a repeated block
    pub block_min_chars: usize,

    /// Consecutive repeats of one word that count as degenerate
    pub word_repetition_threshold: usize,

    /// Consecutive repeats of one character that count as degenerate
    pub char_repetition_threshold: usize,

    /// Shortest text inspected for word/character repetition
    pub min_repetition_text: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            min_line_length: 10,
            max_line_occurrences: 2,
            max_tracked_lines: 1024,
            metadata_history: 32,
            block_min_lines: 3,
            block_min_chars: 100,
            word_repetition_threshold: 12,
            char_repetition_threshold: 50,
            min_repetition_text: 40,
        }
    }
}

impl StreamingConfig {
    /// Validate streaming thresholds
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_line_occurrences", self.max_line_occurrences),
            ("max_tracked_lines", self.max_tracked_lines),
            ("metadata_history", self.metadata_history),
            ("block_min_lines", self.block_min_lines),
            ("word_repetition_threshold", self.word_repetition_threshold),
            ("char_repetition_threshold", self.char_repetition_threshold),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(CoreError::invalid_field(
                    "STREAMING_THRESHOLD_ZERO",
                    field,
                    format!("{} must be greater than 0", field),
                    "Streaming filter configuration",
                    "Use a positive threshold",
                ));
            }
        }
        if self.word_repetition_threshold < 2 || self.char_repetition_threshold < 2 {
            return Err(CoreError::configuration(
                "STREAMING_REPETITION_TOO_LOW",
                "Repetition thresholds below 2 flag every word or character",
                "Streaming filter configuration",
                "Use thresholds of at least 2",
            ));
        }
        Ok(())
    }
}

/// Relative weights of the similarity signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub simhash: f64,
    pub levenshtein: f64,
    pub jaccard: f64,
    pub cosine: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            simhash: 0.2,
            levenshtein: 0.3,
            jaccard: 0.25,
            cosine: 0.25,
        }
    }
}

impl SimilarityWeights {
    /// Sum of all weights
    pub fn total(&self) -> f64 {
        self.simhash + self.levenshtein + self.jaccard + self.cosine
    }

    fn validate(&self) -> Result<()> {
        let all = [self.simhash, self.levenshtein, self.jaccard, self.cosine];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CoreError::invalid_field(
                "DETECTOR_WEIGHT_NEGATIVE",
                "weights",
                "Similarity weights must be finite and non-negative",
                format!("weights: {:?}", self),
                "Use values such as 0.25 for each signal",
            ));
        }
        if self.total() <= 0.0 {
            return Err(CoreError::invalid_field(
                "DETECTOR_WEIGHT_ZERO",
                "weights",
                "At least one similarity weight must be positive",
                format!("weights: {:?}", self),
                "Give at least one signal a positive weight",
            ));
        }
        Ok(())
    }
}

/// Batch duplication detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Similarity at or above which two blocks are duplicates (0.0 to 1.0)
    pub similarity_threshold: f64,

    /// Blocks with fewer non-blank lines are not compared
    pub min_block_lines: usize,

    /// Blocks with fewer non-whitespace characters are not compared
    pub min_block_chars: usize,

    /// Run distributed repetition detection
    pub enable_distributed_detection: bool,

    /// Cycles required before a repeating pattern is reported
    pub min_pattern_repetitions: usize,

    /// Longest cycle (in lines) searched for
    pub max_pattern_length: usize,

    /// Maximum number of cached fingerprints
    pub cache_max_size: usize,

    /// Weights of the similarity signals
    pub weights: SimilarityWeights,
}

/// Fingerprint cache capacity used by default builds
pub const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(size) => size,
    None => unreachable!(),
};

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            min_block_lines: 2,
            min_block_chars: 20,
            enable_distributed_detection: true,
            min_pattern_repetitions: 3,
            max_pattern_length: 8,
            cache_max_size: DEFAULT_CACHE_SIZE.get(),
            weights: SimilarityWeights::default(),
        }
    }
}

impl DetectorConfig {
    /// Validate detector settings
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CoreError::invalid_field(
                "DETECTOR_THRESHOLD_RANGE",
                "similarity_threshold",
                "similarity_threshold must be between 0.0 and 1.0",
                format!("similarity_threshold = {}", self.similarity_threshold),
                "Use a value such as 0.85",
            ));
        }
        if self.min_block_lines == 0 {
            return Err(CoreError::invalid_field(
                "DETECTOR_MIN_LINES_ZERO",
                "min_block_lines",
                "min_block_lines must be greater than 0",
                "Batch detector configuration",
                "Use a positive minimum block size",
            ));
        }
        if self.min_pattern_repetitions < 2 {
            return Err(CoreError::invalid_field(
                "DETECTOR_PATTERN_REPETITIONS",
                "min_pattern_repetitions",
                "min_pattern_repetitions must be at least 2",
                format!("min_pattern_repetitions = {}", self.min_pattern_repetitions),
                "A pattern needs at least two cycles to repeat",
            ));
        }
        if self.max_pattern_length < 2 {
            return Err(CoreError::invalid_field(
                "DETECTOR_PATTERN_LENGTH",
                "max_pattern_length",
                "max_pattern_length must be at least 2",
                format!("max_pattern_length = {}", self.max_pattern_length),
                "Use a cycle length of 2 or more",
            ));
        }
        if self.cache_max_size == 0 {
            return Err(CoreError::invalid_field(
                "DETECTOR_CACHE_ZERO",
                "cache_max_size",
                "cache_max_size must be greater than 0",
                "Batch detector configuration",
                "Use a positive cache capacity",
            ));
        }
        self.weights.validate()
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            CoreError::configuration(
                "CONFIG_PARSE_FAILED",
                format!("Failed to parse configuration: {}", e),
                format!("File: {}", path.display()),
                "Check the TOML syntax and field names",
            )
            .with_config_path(path)
        })?;
        config.validate().map_err(|e| e.with_config_path(path))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            CoreError::configuration(
                "CONFIG_SERIALIZE_FAILED",
                format!("Failed to serialize configuration: {}", e),
                "Writing pipeline configuration",
                "Report this as a bug",
            )
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.stop.validate()?;
        self.streaming.validate()?;
        self.detector.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.template.id, "default");
        assert_eq!(config.stop.max_tokens, 512);
        assert_eq!(config.streaming.max_line_occurrences, 2);
        assert!(config.detector.enable_distributed_detection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();
        config.stop.max_tokens = 0;
        assert_eq!(config.validate().unwrap_err().code(), "STOP_MAX_TOKENS_ZERO");

        let mut config = PipelineConfig::default();
        config.detector.similarity_threshold = -0.1;
        assert_eq!(config.validate().unwrap_err().code(), "DETECTOR_THRESHOLD_RANGE");

        let mut config = PipelineConfig::default();
        config.detector.weights.cosine = -1.0;
        assert_eq!(config.validate().unwrap_err().code(), "DETECTOR_WEIGHT_NEGATIVE");

        let mut config = PipelineConfig::default();
        config.stop.stop_sequences.push(String::new());
        assert_eq!(config.validate().unwrap_err().code(), "STOP_SEQUENCE_EMPTY");
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");

        let mut config = PipelineConfig::default();
        config.template.id = "starcoder".to_string();
        config.stop.stop_sequences = vec!["\n\n\n".to_string()];
        config.to_file(&path).unwrap();

        let loaded = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str("[stop]\nmax_tokens = 32\n").unwrap();
        assert_eq!(config.stop.max_tokens, 32);
        assert_eq!(config.stop.max_lines, 64);
        assert_eq!(config.detector, DetectorConfig::default());
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[detector]\nsimilarity_threshold = 4.0\n").unwrap();

        match PipelineConfig::from_file(&path).unwrap_err() {
            CoreError::Configuration { config_path, field_name, .. } => {
                assert_eq!(config_path.unwrap(), path);
                assert_eq!(field_name.as_deref(), Some("similarity_threshold"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
