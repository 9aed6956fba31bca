use crate::server::WebState;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use opencti_observability::exposition::{encode_samples, merge_families, render_metrics};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const SCRAPE_TIMEOUT_HEADER: &str = "x-prometheus-scrape-timeout-seconds";

/// Run one collection and return the text exposition.
pub async fn metrics(State(state): State<Arc<WebState>>, headers: HeaderMap) -> Response {
    let timeout = effective_timeout(state.scrape_timeout, &headers);
    debug!(timeout_ms = timeout.as_millis() as u64, "Scrape started");

    let samples = state.collector.collect(timeout).await;
    let families = merge_families(
        encode_samples(&state.collector, &samples),
        state.metrics.gather(),
    );

    (
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        render_metrics(&families),
    )
        .into_response()
}

/// The configured timeout, lowered to the scraper's own when that is smaller.
pub fn effective_timeout(configured: Duration, headers: &HeaderMap) -> Duration {
    headers
        .get(SCRAPE_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(|scraper| configured.min(scraper))
        .unwrap_or(configured)
}
