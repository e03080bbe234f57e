//! Replay command: feed recorded model output through the generation guard
//!
//! The input is split into fixed-size chunks that stand in for tokens, so a
//! captured runaway generation can be checked against the stop and
//! repetition rules without a model.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use futures::stream;
use serde_json::json;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::commands::Command;
use crate::config::Config;
use crate::utils::{chunk_text, format_millis, print_heading, print_output, read_input};

#[derive(Args, Debug)]
pub struct ReplayCommand {
    /// Recorded output file (reads stdin when omitted)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Language id used by the repetition checks
    #[arg(short, long)]
    pub language: Option<String>,

    /// Characters per simulated token
    #[arg(long, default_value_t = 4)]
    pub chunk_size: usize,

    /// Template id (defaults to the configured template)
    #[arg(short, long)]
    pub template: Option<String>,
}

#[async_trait]
impl Command for ReplayCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing replay command: {:?}", self);

        if self.chunk_size == 0 {
            anyhow::bail!("--chunk-size must be greater than 0");
        }

        let recorded = read_input(self.input.as_deref())?;
        let tokens = chunk_text(&recorded, self.chunk_size);
        info!(tokens = tokens.len(), chunk_size = self.chunk_size, "Replaying recorded output");

        let pipeline = config.pipeline(self.template.as_deref())?;
        let language = config.language(self.language.as_deref());
        let token_stream = stream::iter(tokens.into_iter().map(Ok::<_, std::io::Error>));
        let output = pipeline
            .generate(token_stream, language)
            .await
            .context("Replay failed")?;

        if json_output {
            return print_output(&serde_json::to_value(&output)?, true);
        }

        let finish_reason = output
            .finish_reason
            .map(|reason| reason.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let stats = output.stats.unwrap_or_default();
        let mut summary = json!({
            "finish_reason": finish_reason,
            "tokens": stats.tokens,
            "lines": stats.lines,
            "duplicates_removed": output.report.duplicates_removed,
        });
        if let Some(ms) = output.total_time_ms {
            summary["time"] = json!(format_millis(ms));
        }
        print_output(&summary, false)?;

        print_heading("Output");
        println!("{}", output.text);
        Ok(())
    }
}
