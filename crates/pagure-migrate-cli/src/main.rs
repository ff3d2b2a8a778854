//! Pagure Migrate CLI - move Pagure tickets onto a GitLab project.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;
mod output;

/// Pagure Migrate - replay Pagure tickets as GitLab issues
#[derive(Parser, Debug)]
#[command(name = "pagure-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to read from, where to write to, and with which credentials.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// Path to configuration file [default: pagure-migrate.yaml if present]
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Source forge root, e.g. https://pagure.io
    #[arg(long)]
    pub source_url: Option<String>,

    /// Source repository name
    #[arg(long)]
    pub source_repo: Option<String>,

    /// Source API token
    #[arg(long, env = "PAGURE_TOKEN", hide_env_values = true)]
    pub source_token: Option<String>,

    /// Root of author profile links
    #[arg(long)]
    pub account_url: Option<String>,

    /// Destination instance root, e.g. https://gitlab.com
    #[arg(long)]
    pub destination_url: Option<String>,

    /// Destination project path or id
    #[arg(long)]
    pub destination_project: Option<String>,

    /// Destination personal access token
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub destination_token: Option<String>,

    /// Tickets to migrate: open, closed or all
    #[arg(short, long)]
    pub status: Option<String>,

    /// Tickets per listing page
    #[arg(long)]
    pub page_size: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Options of a ticket transfer.
#[derive(Args, Debug, Default)]
pub struct TransferArgs {
    /// Copy ticket tags as labels
    #[arg(long)]
    pub labels: bool,

    /// Copy the private flag as confidentiality
    #[arg(long)]
    pub secret: bool,

    /// Keep source ticket numbers on the destination
    #[arg(long)]
    pub series: bool,

    /// Only these ticket ids, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with = "ranges")]
    pub select: Option<Vec<u64>>,

    /// Only this inclusive id range, e.g. 10-25
    #[arg(long)]
    pub ranges: Option<String>,

    /// Stop the run when a request gets no response
    #[arg(long)]
    pub abort_on_transport: bool,

    /// Stop the run on the first failure of any kind
    #[arg(long)]
    pub fail_fast: bool,

    /// Write the JSON report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Migrate tickets and their comments
    Tkts {
        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Count the tickets in scope without migrating
    Count {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    logging::init_logging(log_level, cli.json_logs);

    let result = match cli.command {
        Commands::Tkts {
            connection,
            transfer,
        } => commands::tkts(&connection, &transfer).await,
        Commands::Count { connection } => commands::count(&connection).await,
        Commands::Version => {
            println!("pagure-migrate {}", pagure_migrate::VERSION);
            Ok(())
        }
    };

    if let Err(e) = result {
        output::failure(&format!("{e:#}"));
        std::process::exit(1);
    }
}
