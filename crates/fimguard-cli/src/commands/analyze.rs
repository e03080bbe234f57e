//! Analyze command: report duplicated content in a finished completion

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use fimguard_core::prelude::*;
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

use crate::commands::Command;
use crate::config::Config;
use crate::utils::{print_heading, print_output, read_input};

#[derive(Args, Debug)]
pub struct AnalyzeCommand {
    /// Code file to analyze (reads stdin when omitted)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Language id used for comment stripping and keywords
    #[arg(short, long)]
    pub language: Option<String>,

    /// Print the cleaned code after the report
    #[arg(long)]
    pub show_cleaned: bool,
}

#[derive(Tabled)]
struct GroupRow {
    kind: String,
    lines: String,
    occurrences: usize,
    similarity: String,
    locations: String,
}

#[derive(Tabled)]
struct PatternRow {
    cycle: usize,
    lines: String,
    occurrences: usize,
    first: String,
}

#[async_trait]
impl Command for AnalyzeCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing analyze command: {:?}", self);

        let code = read_input(self.input.as_deref())?;
        let language = config.language(self.language.as_deref());
        let detector = DuplicationDetector::new(config.pipeline.detector.clone())
            .context("Failed to build duplication detector")?;
        let report = detector.detect_duplicates(&code, language);

        if json_output {
            print_output(&serde_json::to_value(&report)?, true)?;
        } else {
            self.print_report(&report);
        }
        Ok(())
    }
}

impl AnalyzeCommand {
    fn print_report(&self, report: &DuplicateReport) {
        if !report.has_duplicates {
            println!("No duplicated content found ({} lines)", report.original_line_count);
            return;
        }

        if !report.duplicate_blocks.is_empty() {
            print_heading("Duplicate blocks");
            let rows: Vec<GroupRow> = report
                .duplicate_blocks
                .iter()
                .map(|group| GroupRow {
                    kind: group.kind.to_string(),
                    lines: format!("{}-{}", group.start_line, group.end_line),
                    occurrences: group.occurrences,
                    similarity: format!("{:.3}", group.similarity),
                    locations: group
                        .locations
                        .iter()
                        .map(|span| format!("{}-{}", span.start_line, span.end_line))
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::modern()));
        }

        if !report.distributed_patterns.is_empty() {
            print_heading("Repeated line cycles");
            let rows: Vec<PatternRow> = report
                .distributed_patterns
                .iter()
                .map(|pattern| PatternRow {
                    cycle: pattern.pattern_elements.len(),
                    lines: format!("{}-{}", pattern.start_line, pattern.end_line),
                    occurrences: pattern.occurrences,
                    first: pattern.pattern_elements.first().cloned().unwrap_or_default(),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::modern()));
        }

        println!(
            "Removed {} duplicate occurrence(s): {} -> {} lines",
            report.duplicates_removed, report.original_line_count, report.cleaned_line_count
        );

        if self.show_cleaned {
            print_heading("Cleaned code");
            println!("{}", report.cleaned_code);
        }
    }
}
