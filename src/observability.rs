use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing_subscriber::EnvFilter;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "wingslot_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "wingslot_http_request_duration_seconds";

/// Counter: booking mutations. Labels: op, outcome.
pub const BOOKING_MUTATIONS_TOTAL: &str = "wingslot_booking_mutations_total";

/// Counter: mutations rejected because of an overlapping booking. Labels: op.
pub const BOOKING_CONFLICTS_TOTAL: &str = "wingslot_booking_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: live bookings across all resources.
pub const BOOKINGS_ACTIVE: &str = "wingslot_bookings_active";

/// Histogram: log group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "wingslot_wal_flush_duration_seconds";

/// Histogram: log group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "wingslot_wal_flush_batch_size";

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wingslot=info,tower_http=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an engine outcome to a short label for metrics.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(EngineError::InvalidInput(_)) => "invalid_input",
        Err(EngineError::InvalidRange { .. }) => "invalid_range",
        Err(EngineError::Conflict { .. }) => "conflict",
        Err(EngineError::NotFound(_)) => "not_found",
        Err(EngineError::LimitExceeded(_)) => "limit_exceeded",
        Err(EngineError::Storage(_)) => "storage_error",
        Err(EngineError::InvariantViolation { .. }) => "invariant_violation",
    }
}

pub fn record_mutation<T>(op: &'static str, result: &Result<T, EngineError>) {
    let outcome = outcome_label(result);
    metrics::counter!(BOOKING_MUTATIONS_TOTAL, "op" => op, "outcome" => outcome).increment(1);
    if matches!(result, Err(EngineError::Conflict { .. })) {
        metrics::counter!(BOOKING_CONFLICTS_TOTAL, "op" => op).increment(1);
    }
}

/// Axum middleware recording request count and latency per matched route.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed().as_secs_f64();

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "route" => route)
        .record(elapsed);
    response
}
