//! Discovery-backed protocol clients.

pub mod grpc;
pub mod http;

use std::time::Duration;

use sextant_registry::{Discovery, Endpoint, Scheme, ServiceInstance};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::TransportError;

pub use grpc::connect_channel;
pub use http::HttpClient;

/// How long, and how eagerly, to wait for a service to appear in the
/// registry before giving up.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Poll the registry until `service` has at least one instance.
///
/// Transient backend errors are retried until the deadline; only the
/// deadline itself is fatal.
pub async fn wait_for_service(
    discovery: &dyn Discovery,
    service: &str,
    opts: &ResolveOptions,
) -> Result<Vec<ServiceInstance>, TransportError> {
    let started = Instant::now();
    loop {
        match discovery.resolve(service).await {
            Ok(instances) if !instances.is_empty() => return Ok(instances),
            Ok(_) => debug!(service, "service not yet registered"),
            Err(err) => warn!(service, error = %err, "resolve failed, retrying"),
        }
        if started.elapsed() >= opts.timeout {
            return Err(TransportError::ResolveTimeout {
                service: service.to_string(),
                waited: started.elapsed(),
            });
        }
        tokio::time::sleep(opts.poll_interval).await;
    }
}

/// First endpoint speaking `scheme` on an instance that is up.
pub fn select_endpoint(
    instances: &[ServiceInstance],
    service: &str,
    scheme: Scheme,
) -> Result<Endpoint, TransportError> {
    instances
        .iter()
        .filter(|instance| instance.is_up())
        .find_map(|instance| instance.endpoint(scheme))
        .cloned()
        .ok_or_else(|| TransportError::MissingEndpoint {
            service: service.to_string(),
            scheme,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sextant_registry::{InstanceStatus, MemoryRegistry, Registrar};
    use std::sync::Arc;

    fn instance(name: &str) -> ServiceInstance {
        ServiceInstance::new(name, "1.0.0")
            .with_endpoint(Endpoint::new(Scheme::Http, "127.0.0.1", 8000))
            .with_endpoint(Endpoint::new(Scheme::Grpc, "127.0.0.1", 9000))
    }

    #[tokio::test]
    async fn wait_returns_once_an_instance_exists() {
        let registry = MemoryRegistry::new();
        registry.register(&instance("helloworld")).await.unwrap();

        let found = wait_for_service(&registry, "helloworld", &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn wait_picks_up_a_late_registration() {
        let registry = Arc::new(MemoryRegistry::new());
        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.register(&instance("helloworld")).await.unwrap();
        });

        let opts = ResolveOptions {
            timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        };
        let found = wait_for_service(registry.as_ref(), "helloworld", &opts)
            .await
            .unwrap();
        assert_eq!(found[0].name, "helloworld");
    }

    #[tokio::test]
    async fn wait_times_out_on_an_absent_service() {
        let registry = MemoryRegistry::new();
        let opts = ResolveOptions {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        };

        let err = wait_for_service(&registry, "nowhere", &opts)
            .await
            .unwrap_err();
        match err {
            TransportError::ResolveTimeout { service, waited } => {
                assert_eq!(service, "nowhere");
                assert!(waited >= opts.timeout);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn select_prefers_the_requested_scheme() {
        let instances = vec![instance("helloworld")];
        let ep = select_endpoint(&instances, "helloworld", Scheme::Grpc).unwrap();
        assert_eq!(ep.port, 9000);
    }

    #[test]
    fn select_skips_instances_that_are_down() {
        let mut down = instance("helloworld");
        down.status = InstanceStatus::Down;

        let err = select_endpoint(&[down], "helloworld", Scheme::Http).unwrap_err();
        assert!(matches!(err, TransportError::MissingEndpoint { .. }));
    }

    #[test]
    fn select_reports_a_missing_scheme() {
        let http_only = ServiceInstance::new("helloworld", "1.0.0")
            .with_endpoint(Endpoint::new(Scheme::Http, "127.0.0.1", 8000));

        let err = select_endpoint(&[http_only], "helloworld", Scheme::Grpc).unwrap_err();
        match err {
            TransportError::MissingEndpoint { service, scheme } => {
                assert_eq!(service, "helloworld");
                assert_eq!(scheme, Scheme::Grpc);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
