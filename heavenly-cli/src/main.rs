//! # heavenly CLI
//!
//! Runs sandbox scripts against a small host library through the membrane.

mod commands;
mod config;
mod library;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "heavenly")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the session file
    #[arg(long, default_value = "heavenly.yml", env = "HEAVENLY_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link the configured globals, run a script and its invocations
    Run {
        /// Sandbox script, relative to the session file
        script: PathBuf,
    },

    /// Print the linking preamble that would precede a script
    Emit {
        /// Sandbox script, relative to the session file
        script: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries sandbox output
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::WARN.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { script } => commands::run_script(&cli.config, &script),
        Commands::Emit { script } => commands::emit_preamble(&cli.config, &script),
    }
}
