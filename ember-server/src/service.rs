use std::fmt;
use std::sync::Arc;

use ember_config::Config;
use ember_profiling::ParserRegistry;
use ember_statsd::MetricsClient;

use crate::metrics::Metrics;
use crate::services::consumer::{Consumer, ConsumerError, LogConsumer, UpstreamConsumer};
use crate::utils::BufferPool;

/// Indicates the type of failure of the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Creating the HTTP client for the upstream failed.
    #[error("could not initialize the upstream client")]
    Upstream(#[source] ConsumerError),
}

struct StateInner {
    config: Arc<Config>,
    metrics: Metrics,
    buffer_pool: Arc<BufferPool>,
    parsers: ParserRegistry,
    consumer: Arc<dyn Consumer>,
}

/// Server state shared by all requests.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

impl ServiceState {
    /// Creates the state from the configuration.
    ///
    /// Batches are forwarded to the configured upstream, or logged if there is none.
    pub fn start(config: Arc<Config>, metrics: Arc<MetricsClient>) -> Result<Self, ServiceError> {
        let consumer: Arc<dyn Consumer> = match config.upstream() {
            Some(url) => {
                ember_log::info!("forwarding profiles to {url}");
                let consumer = UpstreamConsumer::new(url.clone(), config.upstream_timeout())
                    .map_err(ServiceError::Upstream)?;
                Arc::new(consumer)
            }
            None => {
                ember_log::info!("no upstream configured, profiles are logged and discarded");
                Arc::new(LogConsumer)
            }
        };

        Ok(Self::new(config, metrics, ParserRegistry::default(), consumer))
    }

    /// Creates the state from its parts.
    pub fn new(
        config: Arc<Config>,
        metrics: Arc<MetricsClient>,
        parsers: ParserRegistry,
        consumer: Arc<dyn Consumer>,
    ) -> Self {
        let buffer_pool = Arc::new(BufferPool::new(
            config.buffer_pool_size(),
            config.max_pooled_buffer_size(),
        ));

        Self {
            inner: Arc::new(StateInner {
                config,
                metrics: Metrics::new(metrics),
                buffer_pool,
                parsers,
                consumer,
            }),
        }
    }

    /// Returns an atomically counted reference to the config.
    pub fn config(&self) -> &Arc<Config> {
        &self.inner.config
    }

    /// Returns the metrics registry.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Returns the pool of decompression buffers.
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.inner.buffer_pool
    }

    /// Returns the parsers for all supported formats.
    pub fn parsers(&self) -> &ParserRegistry {
        &self.inner.parsers
    }

    /// Returns the downstream consumer.
    pub fn consumer(&self) -> &dyn Consumer {
        self.inner.consumer.as_ref()
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceState")
            .field("buffer_pool", &self.inner.buffer_pool)
            .field("parsers", &self.inner.parsers)
            .field("consumer", &self.inner.consumer)
            .finish_non_exhaustive()
    }
}
