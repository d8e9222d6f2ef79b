use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Returned by [`RequestContext::check`] once the request must not continue.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("request deadline exceeded")]
pub struct DeadlineExceeded;

#[derive(Debug)]
struct Inner {
    request_id: Uuid,
    start: Instant,
    deadline: Instant,
    token: CancellationToken,
    service: OnceLock<String>,
}

/// State shared between an ingest handler and the task processing its request.
///
/// The context carries the start time and deadline of the request. Processing stages call
/// [`check`](Self::check) between steps and stop once the deadline has passed or the handler has
/// [cancelled](Self::cancel) the request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

impl RequestContext {
    /// Creates a context for a request that starts now and may run for `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let start = Instant::now();

        Self {
            inner: Arc::new(Inner {
                request_id: Uuid::new_v4(),
                start,
                deadline: start + timeout,
                token: CancellationToken::new(),
                service: OnceLock::new(),
            }),
        }
    }

    /// A unique identifier of this request.
    pub fn request_id(&self) -> Uuid {
        self.inner.request_id
    }

    /// The instant after which the request times out.
    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    /// Time since the request was received.
    pub fn elapsed(&self) -> Duration {
        self.inner.start.elapsed()
    }

    /// Records the service name once the query has been validated.
    ///
    /// Only the first call has an effect.
    pub fn set_service(&self, name: &str) {
        self.inner.service.get_or_init(|| name.to_owned());
    }

    /// The service name of the request, or an empty string if it is not known yet.
    pub fn service(&self) -> &str {
        self.inner.service.get().map_or("", String::as_str)
    }

    /// Stops all further processing of this request.
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    /// Resolves once the request has been cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Returns an error if the request was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), DeadlineExceeded> {
        if self.inner.token.is_cancelled() || Instant::now() >= self.inner.deadline {
            return Err(DeadlineExceeded);
        }

        Ok(())
    }
}
