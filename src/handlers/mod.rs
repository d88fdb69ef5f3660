pub mod events;
pub mod live;
pub mod sample;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::pipeline::{IngestError, LookupError};

// ─── Shared response envelope ────────────────────────────────────

/// Every successful API response is `{"ok": true, ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct Ack<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> Ack<T> {
    pub fn new(body: T) -> Json<Self> {
        Json(Self { ok: true, body })
    }
}

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    NotFound,
    BadRequest,
}

impl From<IngestError> for AppError {
    fn from(_: IngestError) -> Self {
        Self::BadRequest
    }
}

impl From<LookupError> for AppError {
    fn from(_: LookupError) -> Self {
        Self::NotFound
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "not found"),
            Self::BadRequest => (StatusCode::BAD_REQUEST, "invalid payload"),
        };

        let body = serde_json::json!({
            "ok":    false,
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
