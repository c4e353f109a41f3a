//! API Server
//!
//! axum server with request tracking, CORS, timeouts, tracing and graceful
//! shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ServerConfig;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Router with the full middleware stack, outermost layer first
pub fn create_app(state: Arc<AppState>, config: &ServerConfig) -> axum::Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        // CORS inside the timeout so preflight is answered directly
        .layer(create_cors_layer(config.allowed_origins.clone()))
        // Request ID closest to the handlers
        .layer(axum::middleware::from_fn(request_id_middleware));

    create_router(state).layer(middleware)
}

pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = create_app(self.state.clone(), &self.config);
        let addr = self.socket_addr()?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Snake arbiter listening on http://{}", addr);
        self.log_server_info();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }

    fn log_server_info(&self) {
        let rules = &self.state.orchestrator.config().game;
        info!("   Version: {}", self.state.version);
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   Request timeout: {}s", self.config.request_timeout_secs);
        info!("   Stake: {}  Coin: {}  Max win: {}", rules.bet_amount, rules.coin_value, rules.max_win_amount);
        info!("Available endpoints:");
        info!("   GET  /api/game/config      - Game parameters");
        info!("   POST /api/game/start       - Stake and start a session");
        info!("   POST /api/game/collect-coin");
        info!("   POST /api/game/cashout");
        info!("   POST /api/game/game-over");
        info!("   GET  /api/game/stats       - Player statistics");
        info!("   GET  /metrics              - Prometheus metrics");
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
