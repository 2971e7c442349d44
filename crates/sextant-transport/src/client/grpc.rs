//! gRPC channel setup resolved through the registry.

use sextant_registry::{Discovery, Scheme};
use tonic::transport::Channel;
use tracing::debug;

use super::{select_endpoint, wait_for_service, ResolveOptions};
use crate::error::TransportError;

/// Resolve `service` through the registry and open a channel to its first
/// healthy gRPC endpoint. Generated tonic clients wrap the channel.
pub async fn connect_channel(
    discovery: &dyn Discovery,
    service: &str,
    opts: &ResolveOptions,
) -> Result<Channel, TransportError> {
    let instances = wait_for_service(discovery, service, opts).await?;
    let endpoint = select_endpoint(&instances, service, Scheme::Grpc)?;
    debug!(service, endpoint = %endpoint, "resolved gRPC endpoint");

    let uri = format!("http://{}", endpoint.addr());
    Channel::from_shared(uri.clone())
        .map_err(|err| TransportError::InvalidUri(err.to_string()))?
        .connect()
        .await
        .map_err(|err| TransportError::Connect {
            endpoint: uri,
            message: err.to_string(),
        })
}
