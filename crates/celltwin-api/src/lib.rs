//! celltwin HTTP API
//!
//! Read-only JSON views of a running [`DigitalTwin`]:
//!
//! | Route | Body |
//! |-------|------|
//! | `GET /state` | [`StateSnapshot`] |
//! | `GET /parts` | every tracked [`Part`], in arrival order |
//! | `GET /parts/{part_id}` | one [`Part`], 404 when unknown |
//! | `GET /metrics` | [`MetricsSnapshot`] |
//! | `GET /health` | `{"status": "ok"}` |

pub mod config;

pub use config::{load_config, ApiConfig, AppConfig, MonitorConfig};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use celltwin_core::{DigitalTwin, MetricsSnapshot, Part, StateSnapshot};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown part: {0}")]
    PartNotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::PartNotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the router over a shared twin
pub fn create_app(twin: Arc<DigitalTwin>) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/parts", get(get_parts))
        .route("/parts/{part_id}", get(get_part))
        .route("/metrics", get(get_metrics))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(twin)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, twin: Arc<DigitalTwin>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "celltwin API listening");
    axum::serve(listener, create_app(twin))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("celltwin API stopped");
    Ok(())
}

async fn get_state(State(twin): State<Arc<DigitalTwin>>) -> Json<StateSnapshot> {
    Json(twin.get_state_snapshot().await)
}

async fn get_parts(State(twin): State<Arc<DigitalTwin>>) -> Json<Vec<Part>> {
    Json(twin.get_parts_snapshot().await)
}

async fn get_part(
    State(twin): State<Arc<DigitalTwin>>,
    Path(part_id): Path<String>,
) -> Result<Json<Part>, ApiError> {
    twin.get_part(&part_id)
        .await
        .map(Json)
        .ok_or(ApiError::PartNotFound(part_id))
}

async fn get_metrics(State(twin): State<Arc<DigitalTwin>>) -> Json<MetricsSnapshot> {
    Json(twin.get_metrics().await)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
