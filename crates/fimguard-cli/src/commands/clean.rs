//! Clean command: strip leaked control tokens from raw model output

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use serde_json::json;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::commands::Command;
use crate::config::Config;
use crate::utils::{print_output, read_input};

#[derive(Args, Debug)]
pub struct CleanCommand {
    /// Raw output file (reads stdin when omitted)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Template id (defaults to the configured template)
    #[arg(short, long)]
    pub template: Option<String>,
}

#[async_trait]
impl Command for CleanCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing clean command: {:?}", self);

        let raw = read_input(self.input.as_deref())?;
        let pipeline = config.pipeline(self.template.as_deref())?;
        let cleaned = pipeline.codec().clean_output(&raw);
        info!(before = raw.len(), after = cleaned.len(), "Cleaned output");

        if json_output {
            print_output(
                &json!({
                    "template": pipeline.codec().template().id,
                    "text": cleaned,
                    "removed_chars": raw.chars().count().saturating_sub(cleaned.chars().count()),
                }),
                true,
            )?;
        } else {
            println!("{}", cleaned);
        }
        Ok(())
    }
}
