mod catalog;
mod cli;
mod downloader;
mod error;
mod helpers;
mod orchestrator;
mod tivo;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use cli::Args;
use orchestrator::{FixedDelay, Orchestrator};
use tivo::TivoClient;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{filter::Builder as TracingFilterBuilder, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Err(e) if e.not_found() => {}
        Ok(_) => {}
        Err(e) => {
            return Err(e).context("Failed to load .env file");
        }
    }

    init_log();

    let args = Args::parse();

    info!(address = %args.address, "Connecting to TiVo...");

    let client = TivoClient::new(&args.address, &args.mak, args.retries)
        .context("Failed to set up TiVo client")?;
    let pacer = FixedDelay(Duration::from_secs(args.delay_secs));

    let summary = Orchestrator::new(&client, &pacer, args.run_options())
        .run(&mut std::io::stdout())
        .await?;

    info!(?summary, "Done");

    Ok(())
}

fn init_log() {
    tracing_subscriber::fmt()
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            TracingFilterBuilder::default()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish()
        .init();
}
