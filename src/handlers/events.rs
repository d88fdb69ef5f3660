use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::pipeline::{EventRecord, IngestRequest};
use crate::AppState;

use super::{Ack, AppError};

// ─── Response bodies ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Empty {}

#[derive(Debug, Serialize)]
pub struct Hint {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EventData {
    pub data: EventRecord,
}

// ─── POST /ingest ────────────────────────────────────────────────

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<Ack<Empty>>, AppError> {
    // Unparseable bodies get the same answer as a missing eventId
    let Json(request) = payload.map_err(|e| {
        debug!(error = %e, "unparseable ingest body");
        AppError::BadRequest
    })?;

    state.pipeline.ingest(request, true)?;

    Ok(Ack::new(Empty {}))
}

// ─── GET /ingest ─────────────────────────────────────────────────

pub async fn ingest_usage() -> Json<Ack<Hint>> {
    Ack::new(Hint {
        message: "Use POST /ingest with JSON payload.",
    })
}

// ─── GET /event/:id ──────────────────────────────────────────────

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ack<EventData>>, AppError> {
    let record = state.pipeline.get(&id)?;
    Ok(Ack::new(EventData { data: record }))
}
