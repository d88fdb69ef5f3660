use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

/// Tower-compatible middleware that adds two response headers:
///
///   X-Response-Time-Us  — total handler wall time in microseconds
///   Server-Timing       — same value in the standard Server-Timing format
///
/// and logs one line per API request.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros();

    // ── Inject response headers ─────────────────────────────────
    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    // Skip static files and long-lived streams
    if !is_streaming(&path) && is_api(&path) {
        info!(
            status = response.status().as_u16(),
            method = %method,
            path = %path,
            elapsed_us = us as u64,
            "request"
        );
    }

    response
}

fn is_api(path: &str) -> bool {
    path.starts_with("/api/")
        || path.starts_with("/ingest")
        || path.starts_with("/event/")
        || path.starts_with("/sample")
}

fn is_streaming(path: &str) -> bool {
    path.contains("/stream") || path == "/ws"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_api_calls_but_not_streams() {
        assert!(is_api("/ingest"));
        assert!(is_api("/event/abc"));
        assert!(is_api("/api/stats"));
        assert!(!is_api("/index.html"));
        assert!(is_streaming("/api/stats/stream"));
        assert!(is_streaming("/ws"));
    }
}
