mod config;
mod errors;
mod interview;
mod llm_client;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::interview::registry::SessionRegistry;
use crate::interview::session::LoggingHandoff;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or invalid env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize streaming LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    let settings = config.interview_settings();
    info!(
        "LLM client initialized (model: {}, temperature: {})",
        settings.model, settings.options.temperature
    );
    info!(
        "Session budget {}s, phase two at {}s remaining, tick {:?}",
        settings.timings.session_seconds,
        settings.timings.phase_two_threshold_seconds,
        settings.tick
    );

    // Evict completed and abandoned sessions in the background
    let sessions = SessionRegistry::new();
    let retention = config.retention_policy();
    sessions.spawn_sweeper(retention, SWEEP_INTERVAL);
    info!(
        "Session retention: {:?} after completion, {:?} when idle",
        retention.completed, retention.abandoned
    );

    // Build app state
    let state = AppState {
        sessions,
        source: Arc::new(llm),
        handoff: Arc::new(LoggingHandoff),
        settings,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
