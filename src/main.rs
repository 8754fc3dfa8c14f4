//! memsim - memory management simulator
//!
//! Usage: memsim [OPTIONS] <COMMAND>
//!
//! Commands:
//!   run   Replay a workload script against the paging, segmentation and
//!         virtual memory engines
//!   show  Print the initial state of all three engines
//!
//! Options:
//!   -c, --config <FILE>  TOML configuration file
//!   -v, --verbose        Log every request, fault and eviction

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use memsim::config::SimConfig;
use memsim::io::{read_script, replay, write_results};
use memsim::manager::{MemoryManager, Request};

#[derive(Parser)]
#[command(name = "memsim")]
#[command(about = "Simulates paging, segmentation and demand-paged virtual memory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a workload script
    Run {
        /// Script file, one request per line
        script: PathBuf,

        /// Write JSON results here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Continue after a failed request
        #[arg(long)]
        keep_going: bool,
    },

    /// Print the initial snapshots
    Show,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Returns whether every replayed request succeeded.
fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => SimConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SimConfig::default(),
    };
    let manager = MemoryManager::new(&config).context("invalid configuration")?;

    match cli.command {
        Commands::Run { script, output, keep_going } => {
            let steps = read_script(&script)
                .with_context(|| format!("reading script {}", script.display()))?;
            let result = replay(&manager, &steps, keep_going);
            write_results(output.as_ref(), &result).context("writing results")?;
            Ok(result.failures == 0 || keep_going)
        }
        Commands::Show => {
            let snapshots = json!({
                "paging": manager.handle(Request::PagingShow)?,
                "segmentation": manager.handle(Request::SegmentShow)?,
                "virtual_memory": manager.handle(Request::VmShow)?,
            });
            write_results(None::<&PathBuf>, &snapshots)?;
            Ok(true)
        }
    }
}
