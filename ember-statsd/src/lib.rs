//! A high-level StatsD metric client built on cadence.
//!
//! ## Defining Metrics
//!
//! In order to use metrics, one needs to first define one of the metric traits on a custom enum.
//! Metric names are declared by implementing [`CounterMetric`], [`TimerMetric`] or
//! [`DistributionMetric`] on an enum. The trait only provides the name, and it pins the metric to
//! one [type][Metric Types], so a counter cannot accidentally be recorded as a timer.
//!
//! ## Creating the Client
//!
//! There is no process-wide client. A [`MetricsClient`] is created once during startup, either
//! with [`MetricsClient::new`] for a statsd upstream or with [`MetricsClient::disabled`] when no
//! upstream is configured, and is then passed to everything that records metrics.
//!
//! ```no_run
//! # use std::collections::BTreeMap;
//! use ember_statsd::{MetricsClient, MetricsClientConfig};
//!
//! let client = MetricsClient::new(MetricsClientConfig {
//!     prefix: "myprefix",
//!     host: "localhost:8125",
//!     default_tags: BTreeMap::new(),
//!     default_sample_rate: 1.0.into(),
//! });
//! ```
//!
//! ## Macro Usage
//!
//! The recommended way to record metrics is by using the [`metric!`] macro. It takes the client as
//! its first argument. See the trait docs for more information on how to record each type of
//! metric.
//!
//! ```
//! use ember_statsd::{metric, CounterMetric, MetricsClient};
//!
//! struct MyCounter;
//!
//! impl CounterMetric for MyCounter {
//!     fn name(&self) -> &'static str {
//!         "counter"
//!     }
//! }
//!
//! let client = MetricsClient::disabled();
//! metric!(client => counter(MyCounter) += 1);
//! ```
//!
//! [Metric Types]: https://github.com/statsd/statsd/blob/master/docs/metric_types.md
use std::collections::BTreeMap;
use std::net::{ToSocketAddrs, UdpSocket};
use std::ops::Deref;

use cadence::{
    BufferedUdpMetricSink, Metric, MetricBuilder, MetricResult, NopMetricSink, QueuingMetricSink,
    SpyMetricSink, StatsdClient,
};
use rand::Rng;
use rand::distr::StandardUniform;

/// Maximum number of metric events that can be queued before we start dropping them
const METRICS_MAX_QUEUE_SIZE: usize = 100_000;

/// A sample rate between `0.0` (no metrics) and `1.0` (all metrics).
#[derive(Debug, Clone, Copy)]
pub struct SampleRate(f64);

impl From<f64> for SampleRate {
    fn from(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

impl From<SampleRate> for f64 {
    fn from(value: SampleRate) -> Self {
        value.0
    }
}

/// A statsd client together with the defaults applied to every metric.
#[derive(Debug)]
pub struct MetricsClient {
    /// The raw statsd client.
    pub statsd_client: StatsdClient,
    /// Default tags to apply to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Global sample rate.
    pub default_sample_rate: SampleRate,
    /// Receiver of all emitted metrics.
    ///
    /// Only available when the client was created with [`MetricsClient::capturing`].
    rx: Option<crossbeam_channel::Receiver<Vec<u8>>>,
}

/// Client configuration used for initialization of [`MetricsClient`].
#[derive(Debug)]
pub struct MetricsClientConfig<'a, A> {
    /// Prefix which is appended to all metric names.
    pub prefix: &'a str,
    /// Host of the metrics upstream.
    pub host: A,
    /// Tags that are added to all metrics.
    pub default_tags: BTreeMap<String, String>,
    /// Default sample rate for metrics, between 0.0 (= 0%) and 1.0 (= 100%)
    pub default_sample_rate: SampleRate,
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd_client
    }
}

impl MetricsClient {
    /// Creates a client that reports metrics to statsd over UDP.
    ///
    /// Metrics are queued and flushed from a background thread, so recording a metric never
    /// blocks on the network.
    pub fn new<A: ToSocketAddrs>(config: MetricsClientConfig<'_, A>) -> MetricResult<Self> {
        let addrs: Vec<_> = config.host.to_socket_addrs()?.collect();
        if let Some(addr) = addrs.first() {
            ember_log::info!("reporting metrics to statsd at {addr}");
        }

        let sample_rate: f64 = config.default_sample_rate.into();
        ember_log::debug!(
            "metrics sample rate is set to {sample_rate}{}",
            if sample_rate == 0.0 {
                ", no metrics will be reported"
            } else {
                ""
            }
        );

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;

        let udp_sink = BufferedUdpMetricSink::from(addrs.as_slice(), socket)?;
        let queuing_sink = QueuingMetricSink::with_capacity(udp_sink, METRICS_MAX_QUEUE_SIZE);

        Ok(Self {
            statsd_client: StatsdClient::from_sink(config.prefix, queuing_sink),
            default_tags: config.default_tags,
            default_sample_rate: config.default_sample_rate,
            rx: None,
        })
    }

    /// Creates a client that discards all metrics.
    pub fn disabled() -> Self {
        Self {
            statsd_client: StatsdClient::from_sink("", NopMetricSink),
            default_tags: BTreeMap::new(),
            default_sample_rate: 1.0.into(),
            rx: None,
        }
    }

    /// Creates a client that keeps all metrics in memory.
    ///
    /// Recorded metrics can be retrieved with [`captures`](Self::captures).
    pub fn capturing() -> Self {
        Self::capturing_with_sample_rate(1.0)
    }

    /// Creates a capturing client with a custom global sample rate.
    #[doc(hidden)]
    pub fn capturing_with_sample_rate(sample_rate: f64) -> Self {
        let (rx, sink) = SpyMetricSink::new();
        Self {
            statsd_client: StatsdClient::from_sink("", sink),
            default_tags: BTreeMap::new(),
            default_sample_rate: sample_rate.into(),
            rx: Some(rx),
        }
    }

    /// Drains all metrics captured since the last call.
    ///
    /// Always empty unless the client was created with [`capturing`](Self::capturing).
    pub fn captures(&self) -> Vec<String> {
        match &self.rx {
            Some(rx) => rx
                .try_iter()
                .map(|x| String::from_utf8_lossy(&x).into_owned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Send a metric with the default tags defined on this `MetricsClient`.
    #[inline(always)]
    pub fn send_metric<'a, T>(&'a self, metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        self.send_metric_with_sample_rate(metric, None)
    }

    /// Send a metric with an explicit sample rate that overrides the global sample rate.
    #[doc(hidden)]
    #[inline(always)]
    pub fn send_metric_with_sample_rate<'a, T>(
        &'a self,
        mut metric: MetricBuilder<'a, '_, T>,
        sample_rate: Option<SampleRate>,
    ) where
        T: Metric + From<String>,
    {
        let effective_sample_rate = match sample_rate {
            Some(sample_rate) => sample_rate.0.min(self.default_sample_rate.0),
            None => self.default_sample_rate.0,
        };
        if !Self::should_send(effective_sample_rate) {
            return;
        }

        for (k, v) in &self.default_tags {
            metric = metric.with_tag(k, v);
        }

        if effective_sample_rate < 1.0 {
            metric = metric.with_sampling_rate(effective_sample_rate);
        }

        if let Err(error) = metric.try_send() {
            ember_log::error!(
                error = &error as &dyn std::error::Error,
                maximum_capacity = METRICS_MAX_QUEUE_SIZE,
                "error sending a metric",
            );
        }
    }

    fn should_send(sample_rate: f64) -> bool {
        if sample_rate <= 0.0 {
            false
        } else if sample_rate >= 1.0 {
            true
        } else {
            let mut rng = rand::rng();
            let s: f64 = rng.sample(StandardUniform);
            s <= sample_rate
        }
    }
}

/// Internal prelude for the macro
#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

/// A metric for durations, reported in milliseconds.
///
/// Timers are sent as distributions, so percentiles are computed by the statsd server.
///
/// ## Example
///
/// ```
/// use std::time::Instant;
///
/// use ember_statsd::{metric, MetricsClient, TimerMetric};
///
/// enum StageTimer {
///     Decompress,
///     Parse,
/// }
///
/// impl TimerMetric for StageTimer {
///     fn name(&self) -> &'static str {
///         match self {
///             Self::Decompress => "stage.decompress",
///             Self::Parse => "stage.parse",
///         }
///     }
/// }
///
/// let client = MetricsClient::disabled();
/// let start = Instant::now();
///
/// metric!(client => timer(StageTimer::Decompress) = start.elapsed());
/// metric!(
///     client => timer(StageTimer::Parse) = start.elapsed(),
///     service = "checkout",
/// );
/// ```
pub trait TimerMetric {
    /// Returns the timer metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for counting events.
///
/// Counters are only ever incremented. Increments of zero are not sent.
///
/// ## Example
///
/// ```
/// use ember_statsd::{metric, CounterMetric, MetricsClient};
///
/// enum UploadCounter {
///     Accepted,
///     Rejected,
/// }
///
/// impl CounterMetric for UploadCounter {
///     fn name(&self) -> &'static str {
///         match self {
///             Self::Accepted => "uploads.accepted",
///             Self::Rejected => "uploads.rejected",
///         }
///     }
/// }
///
/// let client = MetricsClient::disabled();
///
/// metric!(client => counter(UploadCounter::Accepted) += 1);
/// metric!(
///     client => counter(UploadCounter::Rejected) += 1,
///     error_code = "invalid_params",
/// );
/// ```
pub trait CounterMetric {
    /// Returns the counter metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for value distributions such as payload sizes.
///
/// ## Example
///
/// ```
/// use ember_statsd::{metric, DistributionMetric, MetricsClient};
///
/// struct BodySize;
///
/// impl DistributionMetric for BodySize {
///     fn name(&self) -> &'static str {
///         "body_size"
///     }
/// }
///
/// let client = MetricsClient::disabled();
/// let body = vec![0u8; 16];
///
/// metric!(
///     client => distribution(BodySize) = body.len() as u64,
///     service = "svc",
/// );
///
/// // An explicit sample rate can only lower the global rate.
/// metric!(client => distribution(BodySize, sample = 0.01) = body.len() as u64);
/// ```
pub trait DistributionMetric {
    /// Returns the distribution metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// Emits a metric on the given client.
///
/// The client is any expression that dereferences to a [`MetricsClient`].
///
/// See [crate-level documentation](self) for examples.
#[macro_export]
macro_rules! metric {
    // counter increment
    ($client:expr => counter($id:expr) += $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        match $value {
            value if value != 0 => {
                let client: &$crate::MetricsClient = &$client;
                use $crate::_pred::*;
                client.send_metric(
                    client.count_with_tags(&$crate::CounterMetric::name(&$id), value)
                    $(.with_tag(stringify!($($k).*), $v))*
                )
            },
            _ => {},
        };
    };

    // distribution with explicit sample rate (overrides global sample rate)
    ($client:expr => distribution($id:expr, sample = $sample:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {{
        let client: &$crate::MetricsClient = &$client;
        use $crate::_pred::*;
        client.send_metric_with_sample_rate(
            client.distribution_with_tags(&$crate::DistributionMetric::name(&$id), $value)
                $(.with_tag(stringify!($($k).*), $v))*,
            Some($sample.into())
        )
    }};

    // distribution (uses global sample rate)
    ($client:expr => distribution($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {{
        let client: &$crate::MetricsClient = &$client;
        use $crate::_pred::*;
        client.send_metric(
            client.distribution_with_tags(&$crate::DistributionMetric::name(&$id), $value)
                $(.with_tag(stringify!($($k).*), $v))*
        )
    }};

    // timer value (uses global sample rate)
    ($client:expr => timer($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {{
        let client: &$crate::MetricsClient = &$client;
        use $crate::_pred::*;
        client.send_metric(
            // NOTE: cadence distribution support Duration out of the box and converts it to nanos,
            // but we want milliseconds.
            client.distribution_with_tags(&$crate::TimerMetric::name(&$id), $value.as_nanos() as f64 / 1e6)
                $(.with_tag(stringify!($($k).*), $v))*
        )
    }};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct TestCounter;

    impl CounterMetric for TestCounter {
        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct TestDistribution;

    impl DistributionMetric for TestDistribution {
        fn name(&self) -> &'static str {
            "distribution"
        }
    }

    struct TestTimer;

    impl TimerMetric for TestTimer {
        fn name(&self) -> &'static str {
            "timer"
        }
    }

    #[test]
    fn test_capturing_client() {
        let client = MetricsClient::capturing();
        metric!(
            client => counter(TestCounter) += 123,
            server = "server1",
            host = "host1"
        );
        metric!(
            client => distribution(TestDistribution) = 456,
            server = "server2",
            host = "host2"
        );

        assert_eq!(
            client.captures(),
            [
                "counter:123|c|#server:server1,host:host1",
                "distribution:456|d|#server:server2,host:host2"
            ]
        );
        assert!(client.captures().is_empty());
    }

    #[test]
    fn test_disabled_client_captures_nothing() {
        let client = MetricsClient::disabled();
        metric!(client => counter(TestCounter) += 1);
        assert!(client.captures().is_empty());
    }

    #[test]
    fn test_client_behind_arc() {
        let client = std::sync::Arc::new(MetricsClient::capturing());
        metric!(client => counter(TestCounter) += 3, error_code = "success");
        assert_eq!(client.captures(), ["counter:3|c|#error_code:success"]);
    }

    #[test]
    fn test_counter_tags_with_dots() {
        let client = MetricsClient::capturing();
        metric!(
            client => counter(TestCounter) += 10,
            hc.service = "svc",
            server = "server1",
        );
        assert_eq!(
            client.captures(),
            ["counter:10|c|#hc.service:svc,server:server1"]
        );
    }

    #[test]
    fn test_zero_counter_is_skipped() {
        let client = MetricsClient::capturing();
        metric!(client => counter(TestCounter) += 0);
        assert!(client.captures().is_empty());
    }

    #[test]
    fn test_distribution_with_empty_tag() {
        let client = MetricsClient::capturing();
        metric!(
            client => distribution(TestDistribution) = 123,
            service = "svc",
            encoding = "",
        );
        assert_eq!(
            client.captures(),
            ["distribution:123|d|#service:svc,encoding:"]
        );
    }

    #[test]
    fn test_distribution_with_explicit_sample_rate() {
        let client = MetricsClient::capturing();
        metric!(client => distribution(TestDistribution, sample = 0.5) = 123);
        assert_eq!(client.captures(), ["distribution:123|d|@0.5"]);
    }

    #[test]
    fn test_default_tags() {
        let mut client = MetricsClient::capturing();
        client
            .default_tags
            .insert("hostname".to_owned(), "box".to_owned());
        metric!(client => counter(TestCounter) += 1, service = "svc");
        assert_eq!(
            client.captures(),
            ["counter:1|c|#service:svc,hostname:box"]
        );
    }

    #[test]
    fn test_timer() {
        let client = MetricsClient::capturing();
        let duration = Duration::from_secs(100);
        metric!(client => timer(TestTimer) = duration, server = "server1");
        assert_eq!(client.captures(), ["timer:100000|d|#server:server1"]);
    }

    #[test]
    fn test_zero_sample_rate_drops_everything() {
        let client = MetricsClient::capturing_with_sample_rate(0.0);
        metric!(client => counter(TestCounter) += 1);
        assert!(client.captures().is_empty());
    }
}
