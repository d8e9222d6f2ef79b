//! The Ember profile ingest server.
//!
//! This crate contains the [`run`] function which starts the ember server. It accepts Java Flight
//! Recorder uploads from Pyroscope-compatible agents on the `/ingest` endpoint, converts each
//! recording into a batch of profiles and hands the batch to a downstream consumer.
//!
//! # Request Flow
//!
//! Every ingest request passes through these stages:
//!
//!  1. The query string is validated. It carries the profiled window (`from`, `until`), the
//!     application name with labels (`name`) and the upload `format`.
//!  2. The part named after the format is extracted from the multipart body.
//!  3. The part is gunzipped into a pooled buffer, bounded by `http.max_decompressed_size`.
//!  4. The parser for the format splits the recording into profiles.
//!  5. Profiles are assembled into output records and delivered as one batch.
//!
//! The whole flow is bounded by `http.timeout`. When the deadline elapses, the client receives
//! `408 Request Timeout` and the in-flight work is cancelled.
#![warn(missing_docs)]

mod context;
mod endpoints;
mod metrics;
mod middlewares;
mod processing;
mod service;
mod services;
mod statsd;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use ember_config::Config;
use ember_statsd::MetricsClient;

pub use crate::endpoints::BadIngestRequest;
pub use crate::processing::{OutputRecord, RecordAttributes, RecordBatch};
pub use crate::service::{ServiceError, ServiceState};
pub use crate::services::consumer::{Consumer, ConsumerError, LogConsumer, UpstreamConsumer};
pub use crate::services::server::{HttpServer, ServerError, make_app};

/// Runs the ember web server.
///
/// This boots the entire server application and blocks the current thread until a shutdown
/// signal (`SIGINT` or `SIGTERM`) is received or a fatal error happens.
pub fn run(config: Config, metrics: MetricsClient) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("ember-server")
        .enable_all()
        .build()
        .context("failed to create the tokio runtime")?;

    let config = Arc::new(config);
    let metrics = Arc::new(metrics);

    runtime.block_on(async move {
        let service = ServiceState::start(config.clone(), metrics)?;
        let server = HttpServer::bind(config, service).await?;
        server.run(shutdown_signal()).await?;
        anyhow::Ok(())
    })?;

    ember_log::info!("ember shutdown complete");
    Ok(())
}

/// Resolves on the first `SIGINT` or `SIGTERM`.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            ember_log::error!("failed to listen for SIGINT: {}", ember_log::LogError(&error));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                ember_log::error!("failed to listen for SIGTERM: {}", ember_log::LogError(&error));
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => ember_log::info!("received SIGINT, shutting down"),
        () = terminate => ember_log::info!("received SIGTERM, shutting down"),
    }
}
