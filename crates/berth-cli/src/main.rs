use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod fixture;

#[derive(Parser)]
#[command(
    name = "berth",
    about = "Berth: placement ranking for cluster schedulers",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the nodes of a cluster fixture for its placement request.
    ///
    /// The fixture is loaded into an in-memory state store, a snapshot is
    /// taken, and one evaluation runs against it with the fixture's plan.
    Rank {
        /// Cluster fixture (TOML): request, nodes, allocations, plan.
        #[arg(short, long)]
        cluster: PathBuf,
        /// Ranking config (berth.toml). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Print every node that fits instead of only the selected one.
        #[arg(long)]
        all: bool,
    },
    /// Parse and validate a berth.toml, printing the effective config.
    CheckConfig {
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,berth=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rank {
            cluster,
            config,
            format,
            all,
        } => commands::rank::rank(&cluster, config.as_deref(), &format, all),
        Commands::CheckConfig { path } => commands::config::check(&path),
    }
}
