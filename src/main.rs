use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use odinbook::avatars::HttpAvatarFetcher;
use odinbook::config::{Cli, Config};
use odinbook::db;
use odinbook::routes;
use odinbook::state::AppState;
use odinbook::storage::LocalBlobStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    let uploads_path = config.uploads_path();
    std::fs::create_dir_all(&uploads_path)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let blobs = LocalBlobStore::new(uploads_path, config.storage.public_prefix.clone());
    let fetcher = HttpAvatarFetcher::from_config(&config.avatars)?;

    if config.auth.federation_secret.is_none() {
        tracing::info!("No federation secret configured, federated sign-in disabled");
    }

    let state = AppState {
        db: pool,
        config: config.clone(),
        blobs: Arc::new(blobs),
        avatar_fetcher: Arc::new(fetcher),
    };

    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
