use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::infrastructure::repositories::JobRepository;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn health_ready(State(job_repo): State<Arc<dyn JobRepository>>) -> impl IntoResponse {
    match job_repo.ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "job_store": "connected"
            })),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "Job store not reachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "job_store": "disconnected"
                })),
            )
        }
    }
}
