// HTTP server - axum router, shared context and lifecycle

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    Router,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::proxy::{InfoExtractor, InfoExtractorOrchestrator, ResolutionService, StreamRelay};

pub mod error;
pub mod routes;

pub use error::ApiError;

/// Shared application context; immutable after start-up
#[derive(Clone)]
pub struct AppContext {
    pub service: Arc<ResolutionService>,
}

impl AppContext {
    pub fn new(service: ResolutionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Wire the yt-dlp backed pipeline from configuration
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let extractor = InfoExtractorOrchestrator::new(&config.extractor_config());
        Self::with_extractor(config, Box::new(extractor))
    }

    /// Same as `from_config` with a caller-supplied extractor
    pub fn with_extractor(config: &ProxyConfig, extractor: Box<dyn InfoExtractor>) -> Result<Self> {
        let relay = StreamRelay::new(config.relay_config()).context("Invalid relay configuration")?;
        let service = ResolutionService::new(
            extractor,
            relay,
            config.video_policy.clone(),
            config.stream_policy.clone(),
        );
        Ok(Self::new(service))
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, header::RANGE]);

    routes::routes()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Start the HTTP server and run until a shutdown signal arrives
pub async fn start_server(config: ProxyConfig) -> Result<()> {
    let ctx = AppContext::from_config(&config)?;
    serve(config, ctx).await
}

pub async fn serve(config: ProxyConfig, ctx: AppContext) -> Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("Invalid server address")?;

    tracing::info!(
        "Relay mode {}, video policy {}, stream policy {}",
        config.relay_mode,
        config.video_policy,
        config.stream_policy
    );

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
