//! Health check endpoint

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::db::{DbHandle, Engine};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// GET /health - Check database connectivity through the request's handle
pub async fn check<E: Engine>(db: DbHandle<E>) -> impl IntoResponse {
    match db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                reason: None,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check query failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    reason: Some(format!("Database query failed: {}", e)),
                }),
            )
        }
    }
}
