mod api;
mod audit;
mod cancel;
mod cli;
mod config;
mod document;
mod import;
mod push;
mod registry;
mod snapshot;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = cli::Cli::parse();
    cli::run(cli).await
}
