use std::collections::BTreeMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde_json::json;
use tracing::info;

use crate::pipeline::{IngestRequest, IngestionPipeline, TraceStep};

// ─── Constants ───────────────────────────────────────────────────

/// Upper bound on events generated by one bulk trigger.
pub const MAX_SAMPLE_BATCH: usize = 200;

/// Batch size used when the caller gives no count.
pub const DEFAULT_SAMPLE_BATCH: usize = 20;

// ─── Synthetic events ────────────────────────────────────────────

/// Build one plausible HTTP-handler event stamped at `now` (epoch ms).
///
/// Roughly one in twenty events carries an error.
pub fn sample_request(rng: &mut impl Rng, now: i64, index: usize, source: &str) -> IngestRequest {
    let suffix = uuid::Uuid::new_v4().simple().to_string();

    let error_count = if rng.gen_range(0..20u32) == 0 { 1 } else { 0 };
    let metrics = BTreeMap::from([
        ("durationMs".to_owned(), json!(rng.gen_range(50.0..2000.0))),
        ("requestCount".to_owned(), json!(rng.gen_range(1..=20u32))),
        ("errorCount".to_owned(), json!(error_count)),
        ("apdex".to_owned(), json!(rng.gen_range(0.6..=1.0))),
        ("cpuPct".to_owned(), json!(rng.gen_range(5.0..95.0))),
        ("memMb".to_owned(), json!(rng.gen_range(100.0..1000.0))),
    ]);

    IngestRequest {
        event_id: Some(format!("{source}-{now}-{index}-{}", &suffix[..8])),
        name: Some("sample_http".into()),
        service_name: None,
        start_time: Some(now - rng.gen_range(0..60_000i64)),
        end_time: Some(now),
        metrics,
        trace: vec![
            TraceStep {
                name: "handler".into(),
                value: rng.gen_range(0.0..50.0),
            },
            TraceStep {
                name: "db.query".into(),
                value: rng.gen_range(0.0..120.0),
            },
        ],
        tags: BTreeMap::from([("source".to_owned(), source.to_owned())]),
    }
}

// ─── Public entry points ─────────────────────────────────────────

/// Seed every histogram with `count` silent events so the first real
/// events are ranked against a populated window.
pub fn warm_up(pipeline: &IngestionPipeline, count: usize) {
    if count == 0 {
        return;
    }
    let t0 = Instant::now();
    let mut rng = StdRng::from_entropy();
    let now = chrono::Utc::now().timestamp_millis();

    let mut seeded = 0usize;
    for i in 0..count {
        if pipeline
            .ingest(sample_request(&mut rng, now, i, "warmup"), false)
            .is_ok()
        {
            seeded += 1;
        }
    }

    info!(
        seeded,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "histograms warmed up"
    );
}

/// Ingest up to [`MAX_SAMPLE_BATCH`] synthetic events through the live path.
/// Returns how many were generated.
pub fn generate(pipeline: &IngestionPipeline, count: usize) -> usize {
    let count = count.min(MAX_SAMPLE_BATCH);
    let mut rng = StdRng::from_entropy();
    let now = chrono::Utc::now().timestamp_millis();

    for i in 0..count {
        // Synthetic events always carry an id; this cannot be rejected.
        let _ = pipeline.ingest(sample_request(&mut rng, now, i, "sample"), true);
    }
    count
}
