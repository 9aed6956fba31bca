use crate::handlers;
use axum::{Router, routing::get};
use opencti_observability::{ExporterMetrics, OpenCtiCollector};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Shared state for the HTTP handlers.
pub struct WebState {
    pub collector: Arc<OpenCtiCollector>,
    pub metrics: Arc<ExporterMetrics>,
    pub metrics_path: String,
    /// Upper bound for one collection; a smaller Prometheus scrape timeout wins.
    pub scrape_timeout: Duration,
}

/// Build the router: metrics at `metrics_path`, landing page at `/` unless
/// the metrics live there.
pub fn build_router(state: Arc<WebState>) -> Router {
    let mut router = Router::new().route(&state.metrics_path, get(handlers::metrics::metrics));
    if state.metrics_path != "/" {
        router = router.route("/", get(handlers::landing::landing_page));
    }
    router.with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight scrapes.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "Listening for scrapes");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
