mod config;
mod engine;
mod errors;
mod llm_client;
mod models;
mod queue;
mod routes;
mod state;
mod vault;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::engine::orchestrator::Orchestrator;
use crate::engine::reviser::LlmReviser;
use crate::llm_client::{LlmClient, LlmGateway};
use crate::queue::{JobProcessor, QueueWorker};
use crate::routes::build_router;
use crate::state::AppState;
use crate::vault::{DocumentVault, PgDocumentVault};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Fitloop v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client behind the gateway (timeouts, retry, validation, cache)
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);
    let gateway = Arc::new(LlmGateway::new(
        Arc::new(llm),
        config.engine.retry_policy(),
        config.engine.call_timeout(),
        config.engine.cache_capacity,
    ));

    let reviser = Arc::new(LlmReviser::new(gateway.clone()));
    let orchestrator = Orchestrator::new(gateway, reviser, config.engine.clone());

    // Document vault is optional; without it requests must carry résumé text inline
    let vault: Option<Arc<dyn DocumentVault>> = match &config.database_url {
        Some(url) => Some(Arc::new(PgDocumentVault::connect(url).await?)),
        None => {
            warn!("DATABASE_URL not set; document vault disabled");
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Job queue worker is optional
    let worker = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.clone())?;
            info!("Redis client initialized");
            let processor = JobProcessor::new(
                orchestrator.clone(),
                vault.clone(),
                config.optimization.clone(),
            );
            let worker = QueueWorker::new(
                client,
                processor,
                config.job_queue_key.clone(),
                config.result_queue_key.clone(),
            );
            Some(tokio::spawn(worker.run(shutdown_rx.clone())))
        }
        None => {
            info!("REDIS_URL not set; job queue worker disabled");
            None
        }
    };

    // Build app state
    let state = AppState {
        config: config.clone(),
        orchestrator,
        vault,
        shutdown: shutdown_rx,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    if let Some(worker) = worker {
        worker.await?;
    }
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C and broadcasts the cancellation flag to in-flight runs.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
    }
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
}
