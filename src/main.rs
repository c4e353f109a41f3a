//! Snake Arbiter Server Binary
//!
//! Server-authoritative referee for the real-money snake game.

use clap::Parser;
use snake_arbiter::{
    api::{ApiServer, AppState},
    common::SystemClock,
    config::{ArbiterConfig, StorageBackend},
    game_store::{GameStore, MemoryGameStore, RocksGameStore},
    metrics::ArbiterMetrics,
    orchestrator::SessionOrchestrator,
    wallet::{HttpWalletClient, WalletService},
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "snake-arbiter")]
#[command(about = "Server-authoritative snake game arbiter", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Wallet backend base URL
    #[arg(long)]
    wallet_url: Option<String>,

    /// Keep sessions in memory only
    #[arg(long)]
    memory: bool,
}

impl Args {
    fn load_config(&self) -> Result<ArbiterConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ArbiterConfig::from_file(path)?,
            None => ArbiterConfig::default(),
        };

        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.db_path {
            config.storage.data_directory = path.clone();
        }
        if let Some(url) = &self.wallet_url {
            config.wallet.base_url = url.clone();
        }
        if self.memory {
            config.storage.backend = StorageBackend::Memory;
        }

        config.validate()?;
        Ok(config)
    }
}

fn open_store(config: &ArbiterConfig) -> Result<Arc<dyn GameStore>, Box<dyn std::error::Error>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory session store; sessions are lost on restart");
            Ok(Arc::new(MemoryGameStore::new()))
        }
        StorageBackend::RocksDb => {
            info!("Opening session database: {}", config.storage.data_directory);
            Ok(Arc::new(RocksGameStore::open(&config.storage.data_directory)?))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snake_arbiter=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.load_config()?;

    let store = open_store(&config)?;
    let wallet: Arc<dyn WalletService> = Arc::new(HttpWalletClient::new(&config.wallet)?);
    info!("Wallet backend: {}", config.wallet.base_url);

    let orchestrator = Arc::new(SessionOrchestrator::new(
        config.clone(),
        store,
        wallet.clone(),
        Arc::new(SystemClock),
        Arc::new(ArbiterMetrics::new()),
    ));
    let sweeper = orchestrator.spawn_expiry_sweeper();

    let state = Arc::new(AppState::new(orchestrator, wallet));
    let result = ApiServer::new(config.server.clone(), state).run().await;

    sweeper.abort();
    result
}
