//! Deltaflush CLI
//!
//! Command-line tools for exercising the flusher.
//!
//! # Commands
//!
//! - `simulate` - Race writers, syncers and drainers over a simulated backend
//! - `config` - Validate and print a flusher configuration
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::simulate::SimulateOptions;
use deltaflush_testkit::StressConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Deltaflush command-line tools.
#[derive(Parser)]
#[command(name = "deltaflush")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON flusher configuration
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Race writers, syncers and drainers over a simulated backend
    Simulate {
        /// Flush policy (explicit, host-driven); overrides the config file
        #[arg(short, long)]
        policy: Option<String>,

        /// Writer threads
        #[arg(long, default_value = "4")]
        writers: usize,

        /// Sync threads
        #[arg(long, default_value = "2")]
        syncers: usize,

        /// Writeback threads
        #[arg(long, default_value = "1")]
        drainers: usize,

        /// Operations per thread
        #[arg(short = 'n', long, default_value = "200")]
        operations: usize,

        /// Maximum time a writer holds its delta, in microseconds
        #[arg(long, default_value = "200")]
        hold_us: u64,

        /// Added backend latency per transition and flush, in microseconds
        #[arg(long, default_value = "0")]
        latency_us: u64,

        /// Timeout for each sync or writeback call, in milliseconds
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate and print the flusher configuration
    Config {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            policy,
            writers,
            syncers,
            drainers,
            operations,
            hold_us,
            latency_us,
            timeout_ms,
            format,
        } => {
            let mut config = commands::config::load(cli.config.as_deref())?;
            if let Some(policy) = policy {
                config.policy = commands::parse_policy(&policy)?;
            }
            let options = SimulateOptions {
                config,
                stress: StressConfig {
                    writers,
                    syncers,
                    drainers,
                    operations,
                    max_hold: Duration::from_micros(hold_us),
                    op_timeout: Duration::from_millis(timeout_ms),
                },
                backend_latency: Duration::from_micros(latency_us),
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Config { format } => {
            commands::config::run(cli.config.as_deref(), &format)?;
        }
        Commands::Version => {
            println!("Deltaflush CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Deltaflush Core v{}", deltaflush_core::VERSION);
        }
    }

    Ok(())
}
