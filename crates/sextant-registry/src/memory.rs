use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::traits::{Discovery, Registrar};
use crate::types::ServiceInstance;

/// In-process registry, for tests and single-process setups.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    services: Arc<RwLock<HashMap<String, HashMap<String, ServiceInstance>>>>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registrar for MemoryRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        let mut services = self.services.write().await;
        services
            .entry(instance.name.clone())
            .or_default()
            .insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        let mut services = self.services.write().await;
        let removed = services
            .get_mut(&instance.name)
            .and_then(|instances| instances.remove(&instance.id));
        match removed {
            Some(_) => Ok(()),
            None => Err(RegistryError::NotRegistered),
        }
    }
}

#[async_trait]
impl Discovery for MemoryRegistry {
    async fn resolve(&self, service: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let services = self.services.read().await;
        Ok(services
            .get(service)
            .map(|instances| instances.values().cloned().collect())
            .unwrap_or_default())
    }
}
