//! Health and metrics endpoints.
//!
//! The orchestrator exposes only `/health` and `/metrics`; client traffic is
//! the gateway's job.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::domain::error::OrchestratorError;
use crate::services::metrics::PipelineMetrics;

struct AppState {
    metrics: Arc<PipelineMetrics>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.metrics.snapshot().uptime_secs,
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::to_value(state.metrics.snapshot()).unwrap_or(Value::Null))
}

pub fn router(metrics: Arc<PipelineMetrics>) -> Router {
    let state = Arc::new(AppState { metrics });
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(self::metrics))
        .with_state(state)
}

/// Serve until the shutdown signal flips to true.
pub async fn serve(
    port: u16,
    metrics: Arc<PipelineMetrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), OrchestratorError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "http surface listening");

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(Arc::new(PipelineMetrics::new()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_exposes_counters() {
        let metrics = Arc::new(PipelineMetrics::new());
        metrics
            .tasks_dispatched
            .fetch_add(7, std::sync::atomic::Ordering::Relaxed);
        let app = router(metrics);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["tasks_dispatched"], 7);
    }
}
