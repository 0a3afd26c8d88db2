use tracing::{error, info};

use stashd::{ChunkedStore, Config, StoreHandle, WebServer};

#[tokio::main]
async fn main() {
    // Load configuration
    let mut config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    if let Err(e) = config.apply_env() {
        eprintln!("Invalid environment override: {e}");
        std::process::exit(1);
    }

    // Initialize logging
    if let Err(e) = stashd::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        stashd::logging::init_console_only(&config.logging.level);
    }

    info!("stashd - chunked file-storage service");

    if let Err(e) = run(config).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> stashd::Result<()> {
    let handle = StoreHandle::new(&config.database);
    handle.init().await?;
    info!("Backing store ready at {}", config.database.url);

    let store = ChunkedStore::from_config(handle.pool()?.clone(), &config.storage);

    let server = WebServer::new(&config, store)?;
    info!(
        "Server configured on {}:{}",
        config.server.host, config.server.port
    );

    server.run().await?;

    handle.shutdown().await;
    Ok(())
}
