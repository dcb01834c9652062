//! jumpstudy gateway - main entry point.

use anyhow::Context;
use access_gate::AccessGate;
use credit_ledger::Ledger;
use risk_engine::{ActivityTracker, GENERATION_WINDOW};
use std::net::SocketAddr;
use std::sync::Arc;
use study_gateway::api::{self, AppState};
use study_gateway::{AppConfig, AppResult, OpenAiProvider};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.server.log_level);

    info!("Starting jumpstudy gateway...");

    let ledger = Ledger::open(config.ledger.clone()).await?;

    // Activity retention must cover the largest scoring window.
    let activity = ActivityTracker::new(GENERATION_WINDOW);

    let gate = Arc::new(AccessGate::new(
        ledger.clone(),
        activity,
        config.gate.clone(),
    ));

    let provider = Arc::new(OpenAiProvider::new(
        &config.provider.api_key,
        &config.provider.base_url,
        &config.provider.model,
        &config.provider.image_model,
        config.provider.timeout,
        config.provider.max_retries,
    )?);

    info!("Provider endpoint: {}", config.provider.base_url);
    info!("Ledger snapshot: {:?}", config.ledger.storage_path);

    let state = Arc::new(AppState::new(ledger, gate, provider));
    let router = api::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Gateway listening on {}", addr);

    axum::serve(listener, router)
        .await
        .context("Server error")?;

    Ok(())
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
