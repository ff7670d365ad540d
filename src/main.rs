// =============================================================================
// fluid-risk-engine — pre-trade risk-decision service
// =============================================================================
//
// Bootstrap: load env, init structured logging, load runtime config, load
// historical vectors into pattern memory, serve the HTTP surface, shut down
// gracefully on Ctrl-C.
// =============================================================================

mod adjuster;
mod api;
mod app_state;
mod cache;
mod confidence;
mod decision_envelope;
mod equity;
mod error;
mod feature_provider;
mod fluid_risk;
mod outcome_intake;
mod pattern_memory;
mod ranges;
mod rec_pullback;
mod runtime_config;
mod telemetry;
mod types;
mod vector;
mod vector_store;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "engine_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("ENGINE_CONFIG_PATH").unwrap_or_else(|_| CONFIG_PATH.to_string());
    let config = match RuntimeConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "failed to load runtime config, using defaults");
            RuntimeConfig::default()
        }
    };
    let config = config.apply_env_overrides();

    info!(bind_addr = %config.bind_addr, "starting fluid-risk-engine");

    let state = Arc::new(AppState::new(config.clone()));

    // Bulk-load historical vectors into pattern memory before serving
    // traffic. A failure here is non-fatal: the engine starts with empty
    // memory and every component falls back to its neutral default.
    if config.use_remote_vector_store {
        match vector_store::load_remote(&config.vector_store_url, None).await {
            Ok((vectors, report)) => {
                info!(loaded = report.loaded, skipped = report.skipped, "loaded historical vectors");
                state.memory.load_all(vectors);
            }
            Err(e) => warn!(error = %e, "failed to load remote vector store, starting cold"),
        }
    } else {
        let (vectors, report) = vector_store::load_jsonl(&config.vector_store_path);
        info!(loaded = report.loaded, skipped = report.skipped, "loaded historical vectors");
        state.memory.load_all(vectors);
    }

    let app = api::rest::router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");

    let shutdown_config = config.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            if let Err(e) = shutdown_config.save(&config_path) {
                warn!(error = %e, "failed to persist runtime config on shutdown");
            }
        })
        .await?;

    Ok(())
}
