//! Prompt command: frame prefix and suffix files for the active template

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

use crate::commands::Command;
use crate::config::Config;
use crate::utils::{print_output, print_warning};

#[derive(Args, Debug)]
pub struct PromptCommand {
    /// File holding the code before the cursor
    #[arg(long)]
    pub prefix_file: PathBuf,

    /// File holding the code after the cursor
    #[arg(long)]
    pub suffix_file: PathBuf,

    /// Template id (defaults to the configured template)
    #[arg(short, long)]
    pub template: Option<String>,
}

#[async_trait]
impl Command for PromptCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing prompt command: {:?}", self);

        let prefix = std::fs::read_to_string(&self.prefix_file)
            .with_context(|| format!("Failed to read prefix file: {}", self.prefix_file.display()))?;
        let suffix = std::fs::read_to_string(&self.suffix_file)
            .with_context(|| format!("Failed to read suffix file: {}", self.suffix_file.display()))?;

        let pipeline = config.pipeline(self.template.as_deref())?;
        let codec = pipeline.codec();
        if codec.contains_control_token(&prefix) || codec.contains_control_token(&suffix) {
            print_warning("context contains template control tokens; the prompt is built verbatim");
        }
        let prompt = pipeline.build_prompt(&prefix, &suffix);

        if json_output {
            print_output(
                &json!({
                    "template": codec.template().id,
                    "prompt": prompt,
                }),
                true,
            )?;
        } else {
            print!("{}", prompt);
        }
        Ok(())
    }
}
