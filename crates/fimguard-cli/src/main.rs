//! Fimguard CLI - inspect and exercise the FIM completion pipeline
//!
//! Builds prompts, cleans raw model output, reports duplicated content and
//! replays recorded generations through the streaming guard.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

mod commands;
mod config;
mod utils;

use commands::{
    analyze::AnalyzeCommand, clean::CleanCommand, prompt::PromptCommand, replay::ReplayCommand,
    templates::TemplatesCommand, Command,
};

#[derive(Parser)]
#[command(
    name = "fimguard",
    version = env!("CARGO_PKG_VERSION"),
    about = "Output integrity tools for fill-in-the-middle completion",
    long_about = "Build FIM prompts, strip leaked control tokens, detect duplicated code and replay token streams through the generation guard."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FIMGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// JSON output format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a FIM prompt from prefix and suffix files
    #[command(name = "prompt", alias = "p")]
    Prompt(PromptCommand),

    /// Strip control tokens from raw model output
    #[command(name = "clean", alias = "c")]
    Clean(CleanCommand),

    /// Report duplicated blocks and repeated line cycles
    #[command(name = "analyze", alias = "a")]
    Analyze(AnalyzeCommand),

    /// Replay recorded output through the streaming guard
    #[command(name = "replay", alias = "r")]
    Replay(ReplayCommand),

    /// List the registered prompt templates
    #[command(name = "templates", alias = "t")]
    Templates(TemplatesCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    debug!("Fimguard CLI v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match config::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    debug!("Configuration loaded: {:?}", config);

    let result = match cli.command {
        Commands::Prompt(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Clean(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Analyze(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Replay(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Templates(cmd) => cmd.execute(&config, cli.json).await,
    };

    match result {
        Ok(_) => {
            if !cli.quiet {
                info!("Command completed successfully");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };

    // Logs go to stderr so command output on stdout can be piped
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
