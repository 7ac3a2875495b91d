use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bctrack_api::{router, AppState};
use bctrack_common::Config;
use bctrack_ingest::{RedditClient, Tracker};
use bctrack_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let store = Arc::new(Store::connect(&config.database_url).await?);
    store.migrate().await?;

    let client = RedditClient::new(&config)?;
    let tracker = Arc::new(Tracker::new(store.clone(), Arc::new(client), config.clone()));

    let state = Arc::new(AppState { store, tracker });
    let app = router(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Tracker API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
