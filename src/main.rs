// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code, unused_imports)]

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod automation;
mod batch;
mod cli;
mod config;
mod error;
mod events;
mod extract;
mod ledger;
mod listing;
mod recovery;
mod store;
mod types;
mod verify;

#[derive(Parser)]
#[command(
    name = "magpie",
    about = "Magpie — resumable source-script harvester",
    version,
    after_help = "Run 'magpie <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress non-essential logging
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest every script from a listing URL (or one detail URL)
    Fetch {
        /// Listing URL, or a single script detail URL
        url: String,
        /// Output directory (defaults to MAGPIE_OUTPUT_DIR or ./pine_downloads)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Base delay between items, seconds
        #[arg(long, short, default_value = "2.0")]
        delay: f64,
        /// Maximum listing pages to visit
        #[arg(long, short = 'p', default_value = "20")]
        max_pages: u32,
        /// Start fresh, ignoring the ledger (it is still written)
        #[arg(long)]
        no_resume: bool,
        /// Show the browser window
        #[arg(long)]
        visible: bool,
        /// Prefer the fixed-position click fast path (fragile to layout drift)
        #[arg(long)]
        positional_click: bool,
        /// Single-attempt fast mode: no retries, shorter waits
        #[arg(long)]
        fast: bool,
    },
    /// Show ledger counts per category without performing any work
    Status {
        /// Output directory to inspect
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "magpie=debug"
    } else if cli.quiet {
        "magpie=warn"
    } else {
        "magpie=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Fetch {
            url,
            output,
            delay,
            max_pages,
            no_resume,
            visible,
            positional_click,
            fast,
        } => {
            cli::fetch_cmd::run(
                &url,
                output,
                delay,
                max_pages,
                no_resume,
                visible,
                positional_click,
                fast,
            )
            .await
        }
        Commands::Status { output } => cli::status_cmd::run(output).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "magpie", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0 on success, 1 only on unrecoverable setup
    // failure. Per-item failures never reach here.
    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    result
}
