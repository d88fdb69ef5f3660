//! apm-pulse: live performance-telemetry outlier feed.

use std::sync::Arc;

use anyhow::{Context, Result};
use apm_pulse::{generator, server, AppState, IngestionPipeline, PulseConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Configuration ─────────────────────────────────────────
    let config = PulseConfig::load()?;

    // ── 2. Logging ───────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    info!(?config, "starting apm-pulse");

    // ── 3. Build the pipeline ────────────────────────────────────
    let started_at = chrono::Utc::now().timestamp_millis();
    let pipeline = Arc::new(IngestionPipeline::with_options(
        started_at,
        config.pipeline_options(),
    ));
    let state = Arc::new(AppState::new(pipeline.clone(), config.static_dir.clone()));

    // ── 4. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state);

    // ── 5. Bind, warm up & serve ─────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    generator::warm_up(&pipeline, config.warmup_count);

    info!(addr = %config.listen_addr, "listening");
    info!("ingest     → POST http://{}/ingest", config.listen_addr);
    info!("live feed  → ws://{}/ws", config.listen_addr);
    info!("stats      → http://{}/api/stats", config.listen_addr);

    axum::serve(listener, app)
        .await
        .context("server exited with error")?;

    Ok(())
}
