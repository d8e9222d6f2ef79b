//! Downstream consumers of assembled record batches.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use url::Url;

use crate::processing::RecordBatch;

/// An error returned by a [`Consumer`].
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// The batch could not be sent.
    #[error("failed to send batch upstream: {0}")]
    Send(#[from] reqwest::Error),
    /// The downstream rejected the batch.
    #[error("upstream responded with {0}")]
    Status(StatusCode),
}

/// Accepts completed batches of output records.
///
/// Each batch is delivered exactly once. Consumers must not retry internally beyond what their
/// transport does.
#[async_trait]
pub trait Consumer: fmt::Debug + Send + Sync {
    /// Delivers a batch downstream.
    async fn consume(&self, batch: RecordBatch) -> Result<(), ConsumerError>;
}

/// Forwards batches as JSON to an upstream HTTP endpoint.
#[derive(Debug)]
pub struct UpstreamConsumer {
    client: reqwest::Client,
    url: Url,
}

impl UpstreamConsumer {
    /// Creates a consumer posting to `url` with the given request timeout.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, ConsumerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ember/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Consumer for UpstreamConsumer {
    async fn consume(&self, batch: RecordBatch) -> Result<(), ConsumerError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&batch)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConsumerError::Status(status));
        }

        ember_log::trace!(
            request_id = %batch.request_id,
            records = batch.records.len(),
            "forwarded batch upstream",
        );
        Ok(())
    }
}

/// Logs a summary of every batch and discards it.
#[derive(Debug, Default)]
pub struct LogConsumer;

#[async_trait]
impl Consumer for LogConsumer {
    async fn consume(&self, batch: RecordBatch) -> Result<(), ConsumerError> {
        let service = batch
            .records
            .first()
            .map_or("", |record| record.attributes.service_name.as_str());

        ember_log::info!(
            request_id = %batch.request_id,
            service,
            records = batch.records.len(),
            bytes = batch.payload_size(),
            "received profiles",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Json;
    use axum::Router;
    use axum::routing::post;
    use bytes::Bytes;
    use ember_profiling::{PayloadType, ProfileRecord, ProfileType};
    use parking_lot::Mutex;
    use uuid::Uuid;

    use super::*;
    use crate::processing;
    use crate::utils::ValidatedParams;

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    /// Serves an upstream that stores every posted batch and answers with `status`.
    async fn spawn_upstream(status: StatusCode) -> (Url, Received) {
        let received = Received::default();
        let app = Router::new().route(
            "/profiles",
            post({
                let received = received.clone();
                move |Json(batch): Json<serde_json::Value>| {
                    received.lock().push(batch);
                    async move { status }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let url = format!("http://{addr}/profiles").parse().unwrap();
        (url, received)
    }

    fn batch() -> RecordBatch {
        let params = ValidatedParams {
            start: 1000,
            end: 1010,
            name: "svc".to_owned(),
            labels: vec![("env".to_owned(), "prod".to_owned())],
        };
        let profile = ProfileRecord {
            payload: Bytes::from_static(b"recording"),
            payload_type: PayloadType::Jfr,
            profile_type: ProfileType {
                kind: "jfr".to_owned(),
                sample_types: vec![],
                sample_units: vec![],
                period_type: "cpu".to_owned(),
                period_unit: "nanoseconds".to_owned(),
            },
        };

        processing::assemble(Uuid::nil(), &params, vec![profile])
    }

    #[tokio::test]
    async fn test_upstream_consumer() {
        ember_test::setup();

        let (url, received) = spawn_upstream(StatusCode::NO_CONTENT).await;
        let consumer = UpstreamConsumer::new(url, Duration::from_secs(5)).unwrap();

        consumer.consume(batch()).await.unwrap();

        let received = received.lock().clone();
        similar_asserts::assert_eq!(
            received,
            vec![serde_json::json!({
                "request_id": "00000000-0000-0000-0000-000000000000",
                "records": [{
                    "timestamp": 1_000_000_000_000u64,
                    "attributes": {
                        "duration_ns": "10000000000",
                        "service_name": "svc",
                        "tags": {"env": "prod"},
                        "type": "jfr",
                        "sample_types": [],
                        "sample_units": [],
                        "period_type": "cpu",
                        "period_unit": "nanoseconds",
                        "payload_type": "1"
                    },
                    "body": "cmVjb3JkaW5n"
                }]
            })]
        );
    }

    #[tokio::test]
    async fn test_upstream_consumer_rejected() {
        ember_test::setup();

        let (url, received) = spawn_upstream(StatusCode::SERVICE_UNAVAILABLE).await;
        let consumer = UpstreamConsumer::new(url, Duration::from_secs(5)).unwrap();

        let result = consumer.consume(batch()).await;

        match result {
            Err(ConsumerError::Status(status)) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE)
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_log_consumer() {
        ember_test::setup();

        let batch = RecordBatch {
            request_id: Uuid::nil(),
            records: vec![],
        };

        assert!(LogConsumer.consume(batch).await.is_ok());
    }

    #[test]
    fn test_status_error() {
        let error = ConsumerError::Status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            error.to_string(),
            "upstream responded with 503 Service Unavailable"
        );
    }
}
