//! gRPC server built on tonic.

use std::convert::Infallible;
use std::net::SocketAddr;

use async_trait::async_trait;
use http::{Request, Response};
use sextant_registry::{Endpoint, Scheme};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::body::Body as GrpcBody;
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;
use tonic::transport::Server as TonicServer;
use tower::{Service, ServiceBuilder};
use tracing::info;

use super::{advertised_host, Server};
use crate::error::TransportError;
use crate::middleware::{MetricsLayer, RecoveryLayer, RequestLogLayer, RequestMetrics};

/// A set of tonic services bound to a socket, wrapped in the standard
/// middleware chain.
pub struct GrpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    metrics: RequestMetrics,
    routes: RoutesBuilder,
}

impl GrpcServer {
    pub async fn bind(addr: SocketAddr, metrics: &RequestMetrics) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        Ok(Self {
            listener,
            local_addr,
            metrics: metrics.clone(),
            routes: RoutesBuilder::default(),
        })
    }

    /// Add a generated tonic service to this server.
    #[must_use]
    pub fn add_service<S>(mut self, svc: S) -> Self
    where
        S: Service<Request<GrpcBody>, Response = Response<GrpcBody>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.routes.add_service(svc);
        self
    }

    /// The address the listener is actually bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Server for GrpcServer {
    fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            Scheme::Grpc,
            advertised_host(self.local_addr),
            self.local_addr.port(),
        )
    }

    async fn serve(self: Box<Self>, shutdown: CancellationToken) -> Result<(), TransportError> {
        info!(addr = %self.local_addr, "gRPC server listening");
        TonicServer::builder()
            .layer(
                ServiceBuilder::new()
                    .layer(MetricsLayer::new(self.metrics.clone(), Scheme::Grpc))
                    .layer(RequestLogLayer::new(Scheme::Grpc))
                    .layer(RecoveryLayer::new(Scheme::Grpc)),
            )
            .add_routes(self.routes.routes())
            .serve_with_incoming_shutdown(TcpListenerStream::new(self.listener), async move {
                shutdown.cancelled().await;
            })
            .await
            .map_err(|err| TransportError::Serve(err.to_string()))
    }
}
