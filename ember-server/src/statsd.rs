use ember_statsd::{CounterMetric, DistributionMetric, TimerMetric};

/// Counter metrics used by Ember.
pub enum EmberCounters {
    /// Number of ingest requests that completed, including failed requests.
    ///
    /// This metric is tagged with:
    ///  - `service`: The application name from the `name` parameter, or empty if the query could
    ///    not be parsed.
    ///  - `error_code`: `success`, or the tag of the error the request failed with.
    Requests,
}

impl CounterMetric for EmberCounters {
    fn name(&self) -> &'static str {
        match self {
            EmberCounters::Requests => "requests",
        }
    }
}

/// Timer metrics used by Ember.
pub enum EmberTimers {
    /// Total time in milliseconds from receiving an ingest request until the response.
    ///
    /// This metric is tagged with:
    ///  - `service`: The application name, or empty if unknown.
    ///  - `error_code`: `success`, or the tag of the error the request failed with.
    RequestDuration,
}

impl TimerMetric for EmberTimers {
    fn name(&self) -> &'static str {
        match self {
            EmberTimers::RequestDuration => "requests.duration",
        }
    }
}

/// Distribution metrics used by Ember.
pub enum EmberDistributions {
    /// Size of an uploaded profile in bytes after decompression.
    ///
    /// This metric is tagged with:
    ///  - `service`: The application name.
    ///  - `type`: The input format, always `jfr`.
    ///  - `encoding`: Reserved, always empty.
    UncompressedBodySize,
    /// Total payload size in bytes of all profiles parsed from an upload.
    ///
    /// Recorded for every parsed upload, including uploads without any profiles.
    ///
    /// This metric is tagged with:
    ///  - `service`: The application name.
    ///  - `type`: Always `pprof`, regardless of the payload type of the parsed profiles. The
    ///    value is fixed so the series stays continuous with Pyroscope receiver dashboards.
    ///  - `encoding`: Reserved, always empty.
    ParsedBodySize,
}

impl DistributionMetric for EmberDistributions {
    fn name(&self) -> &'static str {
        match self {
            EmberDistributions::UncompressedBodySize => "request.body.uncompressed_size",
            EmberDistributions::ParsedBodySize => "request.body.parsed_size",
        }
    }
}
