use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use eth_yields::aggregator::Aggregator;
use eth_yields::api::{self, state::AppState};
use eth_yields::config::Config;

mod cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eth_yields=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        cli::Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let aggregator = Aggregator::from_config(&config)?;

            let rt = tokio::runtime::Runtime::new().context("creating async runtime")?;
            rt.block_on(api::serve(&host, port, AppState::new(aggregator)))
        }
        cli::Command::Fetch { json } => {
            let aggregator = Aggregator::from_config(&config)?;

            let rt = tokio::runtime::Runtime::new().context("creating async runtime")?;
            let result = rt.block_on(aggregator.assemble());
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                result.print_table();
            }
            Ok(())
        }
        cli::Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
