//! etcd-backed registry: lease-scoped instance records with keep-alive.

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Certificate, Client, ConnectOptions, GetOptions, Identity, PutOptions, TlsOptions,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::{RegistryConfig, TlsConfig};
use crate::error::RegistryError;
use crate::traits::{Discovery, Registrar};
use crate::types::ServiceInstance;

const CLIENT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry client backed by etcd v3.
///
/// Instance records live under `{prefix}/{service}/{id}`, bound to a lease
/// that a background task keeps alive. If the process dies without
/// deregistering, the lease expires and the record disappears with it.
/// Tracks one registration at a time: the running server's own instance.
pub struct EtcdRegistry {
    client: Client,
    config: RegistryConfig,
    lease: Mutex<Option<LeaseHandle>>,
}

struct LeaseHandle {
    lease_id: i64,
    stop: CancellationToken,
    keeper: JoinHandle<()>,
}

impl LeaseHandle {
    async fn shutdown(self) {
        self.stop.cancel();
        if let Err(e) = self.keeper.await {
            if e.is_panic() {
                warn!(lease_id = self.lease_id, "lease keep-alive task panicked");
            }
        }
    }
}

impl EtcdRegistry {
    /// Connect to the registry. Fails fast: a bad config or unreachable
    /// endpoint is an error here, not something retried later.
    pub async fn connect(config: RegistryConfig) -> Result<Self, RegistryError> {
        config.validate()?;

        let mut options = ConnectOptions::new()
            .with_timeout(config.connect_timeout)
            .with_keep_alive(CLIENT_KEEP_ALIVE_INTERVAL, CLIENT_KEEP_ALIVE_TIMEOUT);
        if let Some(tls) = &config.tls {
            options = options.with_tls(build_tls_options(tls)?);
        }

        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| {
                RegistryError::Connection(format!("failed to connect to registry: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            lease: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Registrar for EtcdRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        let value = serde_json::to_string(instance)
            .map_err(|e| RegistryError::Serialisation(e.to_string()))?;
        let key = instance_key(&self.config.prefix, &instance.name, &instance.id);

        let mut lease = self.lease.lock().await;
        if let Some(previous) = lease.take() {
            previous.shutdown().await;
        }

        let mut client = self.client.clone();
        let grant = client
            .lease_grant(lease_ttl_seconds(self.config.lease_ttl), None)
            .await
            .map_err(|e| RegistryError::Backend(format!("lease grant failed: {e}")))?;
        let lease_id = grant.id();

        client
            .put(
                key.clone(),
                value,
                Some(PutOptions::new().with_lease(lease_id)),
            )
            .await
            .map_err(|e| {
                RegistryError::Backend(format!("failed to store instance record: {e}"))
            })?;

        let stop = CancellationToken::new();
        let keeper = tokio::spawn(keep_lease_alive(
            self.client.clone(),
            lease_id,
            self.config.lease_ttl,
            stop.clone(),
        ));
        *lease = Some(LeaseHandle {
            lease_id,
            stop,
            keeper,
        });

        debug!(%key, lease_id, "registered instance");
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        let handle = self
            .lease
            .lock()
            .await
            .take()
            .ok_or(RegistryError::NotRegistered)?;
        let lease_id = handle.lease_id;
        handle.shutdown().await;

        let key = instance_key(&self.config.prefix, &instance.name, &instance.id);
        let mut client = self.client.clone();
        client.delete(key.clone(), None).await.map_err(|e| {
            RegistryError::Backend(format!("failed to delete instance record: {e}"))
        })?;
        if let Err(e) = client.lease_revoke(lease_id).await {
            warn!(lease_id, error = %e, "failed to revoke registration lease");
        }

        debug!(%key, lease_id, "deregistered instance");
        Ok(())
    }
}

#[async_trait]
impl Discovery for EtcdRegistry {
    async fn resolve(&self, service: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let prefix = service_prefix(&self.config.prefix, service);
        let mut client = self.client.clone();
        let response = client
            .get(prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| RegistryError::Backend(format!("lookup of '{service}' failed: {e}")))?;

        let mut instances = Vec::new();
        for kv in response.kvs() {
            match decode_instance(kv.value()) {
                Ok(instance) => instances.push(instance),
                Err(e) => warn!(
                    key = %String::from_utf8_lossy(kv.key()),
                    error = %e,
                    "skipping undecodable instance record"
                ),
            }
        }
        Ok(instances)
    }
}

/// Refresh the lease on a `ttl / 3` cadence until cancelled. Send failures
/// are tolerated (the lease survives until its TTL runs out); a closed
/// stream or a server-side expiry ends the task.
async fn keep_lease_alive(
    mut client: Client,
    lease_id: i64,
    ttl: Duration,
    stop: CancellationToken,
) {
    let (mut keeper, mut stream) = match client.lease_keep_alive(lease_id).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(lease_id, error = %e, "could not open keep-alive stream; lease will expire");
            return;
        }
    };

    let mut tick = tokio::time::interval(keep_alive_interval(ttl));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tick.tick() => {
                if let Err(e) = keeper.keep_alive().await {
                    warn!(lease_id, error = %e, "keep-alive send failed");
                    continue;
                }
                match stream.message().await {
                    Ok(Some(response)) if response.ttl() > 0 => {
                        trace!(lease_id, ttl = response.ttl(), "lease refreshed");
                    }
                    Ok(Some(_)) => {
                        warn!(lease_id, "lease expired on the registry side");
                        break;
                    }
                    Ok(None) => {
                        warn!(lease_id, "keep-alive stream closed by the registry");
                        break;
                    }
                    Err(e) => {
                        warn!(lease_id, error = %e, "keep-alive receive failed");
                    }
                }
            }
        }
    }
}

fn build_tls_options(tls: &TlsConfig) -> Result<TlsOptions, RegistryError> {
    let mut options = TlsOptions::new();
    if let Some(domain) = &tls.domain {
        options = options.domain_name(domain);
    }
    if let Some(ca) = &tls.ca_file {
        let pem = std::fs::read(ca).map_err(|e| {
            RegistryError::InvalidConfig(format!("cannot read CA file {}: {e}", ca.display()))
        })?;
        options = options.ca_certificate(Certificate::from_pem(pem));
    }
    if let (Some(cert), Some(key)) = (&tls.cert_file, &tls.key_file) {
        let cert_pem = std::fs::read(cert).map_err(|e| {
            RegistryError::InvalidConfig(format!("cannot read cert file {}: {e}", cert.display()))
        })?;
        let key_pem = std::fs::read(key).map_err(|e| {
            RegistryError::InvalidConfig(format!("cannot read key file {}: {e}", key.display()))
        })?;
        options = options.identity(Identity::from_pem(cert_pem, key_pem));
    }
    Ok(options)
}

fn instance_key(prefix: &str, service: &str, id: &str) -> String {
    format!("{}/{service}/{id}", prefix.trim_end_matches('/'))
}

fn service_prefix(prefix: &str, service: &str) -> String {
    format!("{}/{service}/", prefix.trim_end_matches('/'))
}

fn decode_instance(raw: &[u8]) -> Result<ServiceInstance, RegistryError> {
    serde_json::from_slice(raw).map_err(|e| RegistryError::Serialisation(e.to_string()))
}

fn lease_ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(2)
}

fn keep_alive_interval(ttl: Duration) -> Duration {
    let third = ttl / 3;
    if third < Duration::from_secs(1) {
        Duration::from_secs(1)
    } else {
        third
    }
}
