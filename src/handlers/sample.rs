use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::generator::{self, DEFAULT_SAMPLE_BATCH};
use crate::AppState;

use super::Ack;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleParams {
    /// Kept as text so junk like `?count=abc` falls back to the default
    /// instead of failing the request.
    #[serde(default)]
    pub count: Option<String>,
}

impl SampleParams {
    fn requested(&self) -> usize {
        self.count
            .as_deref()
            .and_then(|c| c.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SAMPLE_BATCH)
    }
}

#[derive(Debug, Serialize)]
pub struct SampleResult {
    pub count: usize,
}

// ─── POST /sample ────────────────────────────────────────────────

pub async fn generate_samples(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SampleParams>,
) -> Json<Ack<SampleResult>> {
    let count = generator::generate(&state.pipeline, params.requested());
    Ack::new(SampleResult { count })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(count: Option<&str>) -> SampleParams {
        SampleParams {
            count: count.map(str::to_owned),
        }
    }

    #[test]
    fn count_defaults_when_missing_or_junk() {
        assert_eq!(params(None).requested(), 20);
        assert_eq!(params(Some("abc")).requested(), 20);
        assert_eq!(params(Some("0")).requested(), 20);
        assert_eq!(params(Some("7")).requested(), 7);
    }
}
