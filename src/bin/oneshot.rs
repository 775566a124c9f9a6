use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use stampede::config::Config;
use stampede::orchestrator::Orchestrator;
use stampede::session::Mode;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("stampede=debug,info")
        .init();

    info!("Starting stampede one-shot run");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Running {} one-shot clients against {}",
        config.clients, config.server_url
    );

    Orchestrator::new(Arc::new(config), Mode::OneShot)
        .run()
        .await
}
