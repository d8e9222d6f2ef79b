use std::sync::Arc;
use std::time::Duration;

use ember_statsd::{MetricsClient, metric};

use crate::statsd::{EmberCounters, EmberDistributions, EmberTimers};

const INPUT_FORMAT: &str = "jfr";
/// Fixed tag of the parsed size, independent of the payload type. See [`EmberDistributions`].
const OUTPUT_FORMAT: &str = "pprof";

/// Records the metrics of the ingest pipeline.
///
/// Created once per service and shared by all requests.
#[derive(Clone, Debug)]
pub struct Metrics {
    client: Arc<MetricsClient>,
}

impl Metrics {
    /// Creates a registry reporting to `client`.
    pub fn new(client: Arc<MetricsClient>) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &MetricsClient {
        &self.client
    }

    /// Records a completed request together with its latency.
    pub fn record_request(&self, service: &str, error_code: &str, duration: Duration) {
        metric!(
            self.client => counter(EmberCounters::Requests) += 1,
            service = service,
            error_code = error_code,
        );
        metric!(
            self.client => timer(EmberTimers::RequestDuration) = duration,
            service = service,
            error_code = error_code,
        );
    }

    /// Records the decompressed size of an upload.
    pub fn record_uncompressed_size(&self, service: &str, size: usize) {
        metric!(
            self.client => distribution(EmberDistributions::UncompressedBodySize) = size as u64,
            service = service,
            type = INPUT_FORMAT,
            encoding = "",
        );
    }

    /// Records the total payload size of all parsed profiles of an upload.
    pub fn record_parsed_size(&self, service: &str, size: usize) {
        metric!(
            self.client => distribution(EmberDistributions::ParsedBodySize) = size as u64,
            service = service,
            type = OUTPUT_FORMAT,
            encoding = "",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new(Arc::new(MetricsClient::capturing()));
        metrics.record_request("svc", "success", Duration::from_millis(12));

        assert_eq!(
            metrics.client().captures(),
            [
                "requests:1|c|#service:svc,error_code:success",
                "requests.duration:12|d|#service:svc,error_code:success",
            ]
        );
    }

    #[test]
    fn test_record_sizes() {
        let metrics = Metrics::new(Arc::new(MetricsClient::capturing()));
        metrics.record_uncompressed_size("svc", 2048);
        metrics.record_parsed_size("svc", 0);

        assert_eq!(
            metrics.client().captures(),
            [
                "request.body.uncompressed_size:2048|d|#service:svc,type:jfr,encoding:",
                "request.body.parsed_size:0|d|#service:svc,type:pprof,encoding:",
            ]
        );
    }
}
