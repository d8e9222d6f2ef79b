//! Liveness probe for process supervisors.

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// Response body of the liveness probe.
#[derive(Debug, Serialize)]
pub struct Liveness {
    is_healthy: bool,
}

/// Reports that the process is up and accepting connections.
pub async fn handle() -> (StatusCode, Json<Liveness>) {
    (StatusCode::OK, Json(Liveness { is_healthy: true }))
}
