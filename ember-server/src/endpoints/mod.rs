//! Web server endpoints.
//!
//! This module contains the ingest endpoint for profile uploads and the health check.

mod common;
mod health_check;
mod ingest;

use axum::Router;
use axum::routing::{any, get};

use crate::service::ServiceState;

pub use self::common::BadIngestRequest;

/// Builds the router with all endpoints.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        // Every method is routed to the handler, which reports invalid parameters before
        // rejecting the method.
        .route("/ingest", any(ingest::handle))
        .route("/healthcheck/live", get(health_check::handle))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::StatusCode;
    use ember_config::Config;
    use ember_statsd::MetricsClient;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let state = ServiceState::start(
            Arc::new(Config::default()),
            Arc::new(MetricsClient::disabled()),
        )
        .unwrap();

        let request = Request::builder()
            .uri("/healthcheck/live")
            .body(Body::empty())
            .unwrap();
        let response = routes().with_state(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, r#"{"is_healthy":true}"#);
    }
}
