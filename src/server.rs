use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes, middleware, and static serving.
pub fn create_router(state: Arc<AppState>) -> Router {
    let static_dir = state.static_dir.clone();

    Router::new()
        // ── Ingestion / retrieval ───────────────────────────────
        .route(
            "/ingest",
            post(handlers::events::ingest).get(handlers::events::ingest_usage),
        )
        .route("/event/:id", get(handlers::events::get_event))
        // ── Synthetic producer ──────────────────────────────────
        .route("/sample", post(handlers::sample::generate_samples))
        // ── Live feed ───────────────────────────────────────────
        .route("/ws", get(handlers::live::live_feed))
        // ── Pipeline stats ──────────────────────────────────────
        .route("/api/stats", get(stream::get_stats))
        .route("/api/stats/stream", get(stream::stats_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Serve the dashboard's static assets ─────────────────
        .fallback_service(ServeDir::new(static_dir))
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
