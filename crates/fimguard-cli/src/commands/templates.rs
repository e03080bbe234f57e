//! Templates command: list the built-in prompt templates

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use fimguard_core::prelude::*;
use serde_json::json;
use tabled::{settings::Style, Table, Tabled};

use crate::commands::Command;
use crate::config::Config;
use crate::utils::print_output;

#[derive(Args, Debug)]
pub struct TemplatesCommand {
    /// Also list the derived stop tokens
    #[arg(long)]
    pub stops: bool,
}

#[derive(Tabled)]
struct TemplateRow {
    id: String,
    prefix: String,
    suffix: String,
    middle: String,
    eot: String,
}

#[async_trait]
impl Command for TemplatesCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        let registry = TemplateRegistry::builtin();
        let active = &config.pipeline.template.id;
        let templates: Vec<_> = registry.ids().iter().map(|id| registry.lookup(id)).collect();

        if json_output {
            let entries: Vec<_> = templates
                .iter()
                .map(|template| -> Result<serde_json::Value> {
                    let mut entry = serde_json::to_value(template.as_ref())?;
                    if self.stops {
                        entry["stop_tokens"] = json!(template.stop_tokens());
                    }
                    entry["active"] = json!(&template.id == active);
                    Ok(entry)
                })
                .collect::<Result<_>>()?;
            return print_output(&json!({ "templates": entries }), true);
        }

        let rows: Vec<TemplateRow> = templates
            .iter()
            .map(|template| TemplateRow {
                id: if &template.id == active {
                    format!("{} *", template.id)
                } else {
                    template.id.clone()
                },
                prefix: template.prefix.clone(),
                suffix: template.suffix.clone(),
                middle: template.middle.clone(),
                eot: template.eot.clone().unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::modern()));

        if self.stops {
            for template in &templates {
                println!("{}: {}", template.id, template.stop_tokens().join(" "));
            }
        }
        Ok(())
    }
}
