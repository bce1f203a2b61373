//! HTTP endpoint exposing the gauge registry for scraping.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, StatusCode},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::metrics::GaugeRegistry;

/// Content type for Prometheus metrics.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Build the router serving `GET /metrics`.
pub fn router(registry: Arc<GaugeRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(registry)
}

async fn prometheus_metrics(
    State(registry): State<Arc<GaugeRegistry>>,
) -> (StatusCode, [(HeaderName, &'static str); 1], String) {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        registry.render(),
    )
}

/// Bind the metrics listener.
///
/// # Errors
///
/// Fails if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("Serving metrics on http://{}/metrics", listener.local_addr()?);
    Ok(listener)
}

/// Serve the metrics endpoint on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<GaugeRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
