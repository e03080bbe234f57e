//! Configuration management for the fimguard CLI

use anyhow::{Context, Result};
use fimguard_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language assumed when a command is not given `--language`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,

    /// Pipeline settings passed to the core crate
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the default location
    /// when present. Missing default files yield the built-in defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match config_path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        if !config_path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .pipeline
            .validate()
            .with_context(|| format!("Invalid pipeline settings in {}", config_path.display()))?;

        Ok(config)
    }

    /// Language for a command: the explicit flag, then the configured default
    pub fn language<'a>(&'a self, flag: Option<&'a str>) -> Option<&'a str> {
        flag.or(self.default_language.as_deref())
    }

    /// Build a pipeline, switching to `template` when one is given
    pub fn pipeline(&self, template: Option<&str>) -> Result<CompletionPipeline> {
        let mut pipeline =
            CompletionPipeline::new(self.pipeline.clone()).context("Failed to build completion pipeline")?;
        if let Some(id) = template {
            pipeline.select_template(id, self.pipeline.template.custom.as_ref());
        }
        Ok(pipeline)
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
            .join("fimguard")
            .join("config.toml")
    }
}
