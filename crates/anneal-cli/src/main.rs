//! Anneal Command-Line Interface
//!
//! Lists solvers and samples problems on a remote annealing service.
//!
//! ```text
//! anneal solvers
//! anneal sample -i problem.json -n 10
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::common::Connection;
use commands::{sample, solvers, version};

/// Anneal - submit optimization problems to a remote annealing service
#[derive(Parser)]
#[command(name = "anneal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Service API endpoint
    #[arg(long, env = "ANNEAL_API_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Service API token
    #[arg(long, env = "ANNEAL_API_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Configuration file (defaults to ~/.anneal/config.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available solvers
    Solvers {
        /// Bypass the solver cache
        #[arg(long)]
        refresh: bool,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Sample a problem and print the answers
    Sample {
        /// Problem file (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Solver to use (overrides the solver in the file)
        #[arg(short, long)]
        solver: Option<String>,

        /// Number of copies to submit
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Per-problem wait timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let connection = Connection {
        endpoint: cli.endpoint,
        token: cli.token,
        config: cli.config,
    };

    // Execute command
    let result = match cli.command {
        Commands::Solvers { refresh, format } => {
            solvers::execute(&connection, refresh, &format).await
        }

        Commands::Sample {
            input,
            solver,
            count,
            timeout,
            format,
        } => {
            sample::execute(
                &connection,
                &input,
                solver.as_deref(),
                count,
                timeout,
                &format,
            )
            .await
        }

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
