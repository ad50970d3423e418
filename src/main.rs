mod config;
mod encoding;
mod handler;
mod logging;
mod server;
mod store;
mod util;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use config::Config;
use handler::RequestHandler;
use server::Server;

/// RecordDB - create and look up user records through a web form
#[derive(Parser, Debug)]
#[command(name = "recorddb", version)]
struct Cli {
  /// Path to a TOML config file
  #[arg(short, long, env = "RECORDDB_CONFIG")]
  config: Option<String>,

  /// Address to listen on, overrides `server_addr`
  #[arg(long, env = "RECORDDB_LISTEN")]
  listen: Option<String>,

  /// RocksDB data directory, overrides `store.data_path`
  #[arg(long, env = "RECORDDB_DATA_PATH")]
  data_path: Option<String>,

  /// Log level, overrides `log.level`
  #[arg(long, env = "RECORDDB_LOG_LEVEL")]
  log_level: Option<String>,
}

impl Cli {
  /// Load the config file (or defaults) and apply command line overrides
  fn load_config(&self) -> anyhow::Result<Config> {
    let mut config = match &self.config {
      Some(path) => Config::from_file(path)?,
      None => Config::default(),
    };

    if let Some(listen) = &self.listen {
      config.server_addr = listen.clone();
    }
    if let Some(data_path) = &self.data_path {
      config.store.data_path = Some(data_path.clone());
    }
    if let Some(level) = &self.log_level {
      config.log.level = level.clone();
    }

    config.validate()?;
    Ok(config)
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let config = cli.load_config()?;

  // Initialize logging
  logging::init(&config.log)?;

  info!("Starting RecordDB - form-backed record store");
  info!("Version: {}", env!("CARGO_PKG_VERSION"));
  match &cli.config {
    Some(path) => info!("Loaded configuration from {}", path),
    None => info!("No config file given, using defaults"),
  }

  // A store that fails to open leaves the server up, refusing store requests
  let store = match store::open_store(&config.store).await {
    Ok(store) => {
      info!(
        "Record store ready: table '{}', partition '{}'",
        store.table(),
        store.partition()
      );
      Some(store)
    }
    Err(e) => {
      warn!("Record store unavailable, requests will be refused: {}", e);
      None
    }
  };

  let handler = Arc::new(RequestHandler::new(store, config.store.timeout()));
  if !handler.is_available() {
    warn!("Serving pages without a backing store");
  }

  // Create and start HTTP server
  let server = Arc::new(
    Server::bind(&config.server_addr, handler)
      .await
      .with_context(|| format!("failed to bind {}", config.server_addr))?,
  );
  info!("Server listening on: {}", server.local_addr());

  // Runs until Ctrl-C
  server.run().await;
  info!("Server stopped");

  Ok(())
}
