use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bctrack_common::Config;
use bctrack_ingest::{backfill, pipeline::Tracker, source::RedditClient};
use bctrack_store::Store;

#[derive(Parser)]
#[command(name = "ingest", about = "Contraceptive mention tracker ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one full ingestion cycle across all configured sources.
    Cycle,
    /// Re-enrich stored records against the current lexicons.
    Backfill,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    match cli.command {
        Command::Cycle => {
            let client = RedditClient::new(&config)?;
            let tracker = Tracker::new(Arc::new(store), Arc::new(client), config);
            let stats = tracker.run_cycle().await?;
            info!("{stats}");
        }
        Command::Backfill => {
            let stats = backfill::run(&store).await?;
            info!("{stats}");
        }
    }

    Ok(())
}
