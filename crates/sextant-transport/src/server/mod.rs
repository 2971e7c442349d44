//! Protocol servers sharing one lifecycle contract.

pub mod grpc;
pub mod http;

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use sextant_registry::Endpoint;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

pub use grpc::GrpcServer;
pub use http::HttpServer;

/// A bound protocol server the supervisor can advertise and drive.
///
/// Binding happens in the constructor, so `endpoint` is exact even for
/// OS-assigned ports; `serve` runs until the token is cancelled.
#[async_trait]
pub trait Server: Send + Sync {
    /// The endpoint to advertise in the registry.
    fn endpoint(&self) -> Endpoint;

    async fn serve(self: Box<Self>, shutdown: CancellationToken) -> Result<(), TransportError>;
}

/// Host to advertise for a bound address. The unspecified address accepts
/// connections but cannot be dialled, so it is advertised as loopback.
pub(crate) fn advertised_host(addr: SocketAddr) -> String {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => "127.0.0.1".to_string(),
        IpAddr::V6(ip) if ip.is_unspecified() => "::1".to_string(),
        ip => ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_addresses_advertise_loopback() {
        assert_eq!(advertised_host("0.0.0.0:8000".parse().unwrap()), "127.0.0.1");
        assert_eq!(advertised_host("[::]:8000".parse().unwrap()), "::1");
        assert_eq!(advertised_host("10.1.2.3:8000".parse().unwrap()), "10.1.2.3");
    }
}
