use async_trait::async_trait;

use crate::error::RegistryError;
use crate::types::ServiceInstance;

/// Server-side registry operations: announce and withdraw an instance.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError>;

    async fn deregister(&self, instance: &ServiceInstance) -> Result<(), RegistryError>;
}

/// Client-side registry operations: resolve a logical service name to its
/// live instances.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn resolve(&self, service: &str) -> Result<Vec<ServiceInstance>, RegistryError>;
}
