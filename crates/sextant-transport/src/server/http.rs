//! HTTP server built on axum.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;
use sextant_registry::{Endpoint, Scheme};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

use super::{advertised_host, Server};
use crate::error::TransportError;
use crate::middleware::metrics::metrics_router;
use crate::middleware::{MetricsLayer, RecoveryLayer, RequestLogLayer, RequestMetrics};

/// An axum router bound to a socket, wrapped in the standard middleware
/// chain and exposing a Prometheus scrape route.
pub struct HttpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
}

impl HttpServer {
    /// Bind `addr` and assemble the middleware chain around `router`.
    ///
    /// The scrape route is merged outside the chain so that scrapes are
    /// neither logged nor counted.
    pub async fn bind(
        addr: SocketAddr,
        router: Router,
        metrics: &RequestMetrics,
        metrics_path: &str,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        let router = router
            .layer(
                ServiceBuilder::new()
                    .layer(MetricsLayer::new(metrics.clone(), Scheme::Http))
                    .layer(RequestLogLayer::new(Scheme::Http))
                    .layer(RecoveryLayer::new(Scheme::Http)),
            )
            .merge(metrics_router(metrics_path, metrics));

        Ok(Self { listener, local_addr, router })
    }

    /// The address the listener is actually bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Server for HttpServer {
    fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            Scheme::Http,
            advertised_host(self.local_addr),
            self.local_addr.port(),
        )
    }

    async fn serve(self: Box<Self>, shutdown: CancellationToken) -> Result<(), TransportError> {
        info!(addr = %self.local_addr, "HTTP server listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|err| TransportError::Serve(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    async fn bound_server() -> HttpServer {
        let metrics = RequestMetrics::new().unwrap();
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        HttpServer::bind("127.0.0.1:0".parse().unwrap(), router, &metrics, "/metrics")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn bind_reports_the_os_assigned_port() {
        let server = bound_server().await;
        let endpoint = server.endpoint();
        assert_eq!(endpoint.scheme, Scheme::Http);
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_ne!(endpoint.port, 0);
        assert_eq!(endpoint.port, server.local_addr().port());
    }

    #[tokio::test]
    async fn serve_stops_when_the_token_is_cancelled() {
        let server = bound_server().await;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Box::new(server).serve(shutdown.clone()));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
