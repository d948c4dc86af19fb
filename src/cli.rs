use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ETH yield aggregator: pulls yield data from DefiLlama, StakeDAO, Pendle
/// and Origin, and serves it as one normalized list.
#[derive(Parser)]
#[command(name = "eth-yields", version, about)]
pub struct Cli {
    /// TOML file merged over the built-in catalog and endpoints
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve the aggregated yields over HTTP
    Serve {
        /// Bind address (default: from config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (default: from config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Aggregate once and print the result
    Fetch {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}
