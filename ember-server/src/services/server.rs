use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use ember_config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;

use crate::middlewares::{self, CatchPanicLayer};
use crate::service::ServiceState;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[from] std::io::Error),

    /// The server stopped with an error.
    #[error("http server failed")]
    ServeFailed(#[source] std::io::Error),
}

/// Build the axum application with all routes and middleware.
pub fn make_app(service: ServiceState) -> Router {
    // Build the router middleware into a single service which runs _after_ routing. Service
    // builder order defines layers added first will be called first. This means:
    //  - Requests go from top to bottom
    //  - Responses go from bottom to top
    let middleware = ServiceBuilder::new()
        .layer(CatchPanicLayer::custom(middlewares::handle_panic))
        .layer(middlewares::trace_http_layer());

    crate::endpoints::routes()
        .layer(middleware)
        .with_state(service)
}

/// HTTP server service.
///
/// This is the main HTTP server of Ember which hosts the [service](ServiceState) and dispatches
/// incoming traffic to it. The server stops when the shutdown future passed to
/// [`run`](Self::run) resolves.
#[derive(Debug)]
pub struct HttpServer {
    config: Arc<Config>,
    service: ServiceState,
    listener: TcpListener,
}

impl HttpServer {
    /// Binds the listener to the configured address.
    pub async fn bind(config: Arc<Config>, service: ServiceState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen_addr()).await?;

        Ok(Self {
            config,
            service,
            listener,
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// After the shutdown signal, the server stops accepting connections and waits for in-flight
    /// requests for up to the configured shutdown timeout.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            service,
            listener,
        } = self;

        ember_log::info!("spawning http server");
        ember_log::info!("  listening on http://{}/", listener.local_addr()?);

        let token = CancellationToken::new();
        let server = axum::serve(listener, make_app(service))
            .with_graceful_shutdown(token.clone().cancelled_owned())
            .into_future();
        let mut server = std::pin::pin!(server);

        tokio::select! {
            result = &mut server => return result.map_err(ServerError::ServeFailed),
            () = shutdown => (),
        }

        ember_log::info!("shutting down http server");
        token.cancel();

        let timeout = config.shutdown_timeout();
        match tokio::time::timeout(timeout, server).await {
            Ok(result) => result.map_err(ServerError::ServeFailed)?,
            Err(_) => ember_log::warn!("in-flight requests did not complete within {timeout:?}"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ember_profiling::ParserRegistry;
    use ember_statsd::MetricsClient;

    use super::*;
    use crate::services::consumer::LogConsumer;

    #[tokio::test]
    async fn test_bind_and_shutdown() {
        ember_test::setup();

        let config = Config::from_json_value(serde_json::json!({
            "http": {"port": 0, "shutdown_timeout": 1}
        }))
        .unwrap();
        let config = Arc::new(config);

        let service = ServiceState::new(
            config.clone(),
            Arc::new(MetricsClient::disabled()),
            ParserRegistry::default(),
            Arc::new(LogConsumer),
        );

        let server = HttpServer::bind(config, service).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        server.run(std::future::ready(())).await.unwrap();
    }
}
