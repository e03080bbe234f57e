//! Command implementations for the fimguard CLI

pub mod analyze;
pub mod clean;
pub mod prompt;
pub mod replay;
pub mod templates;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for CLI command execution
#[async_trait]
pub trait Command {
    /// Execute the command
    async fn execute(&self, config: &crate::config::Config, json_output: bool) -> Result<()>;
}
