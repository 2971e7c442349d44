use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::RegistryError;

/// Default key prefix for instance records.
pub const DEFAULT_PREFIX: &str = "/sextant/services";

const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the external registry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry endpoints, e.g. `["http://127.0.0.1:2379"]`. Required.
    pub endpoints: Vec<String>,

    /// Key prefix under which instances are stored.
    pub prefix: String,

    /// TTL of the registration lease; the record expires if the keep-alive
    /// stops, so dead instances disappear on their own.
    #[serde(deserialize_with = "deserialize_duration")]
    pub lease_ttl: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,

    /// TLS towards the registry. Certificate verification is always on;
    /// point `ca_file` at a private CA instead of disabling it.
    pub tls: Option<TlsConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            prefix: DEFAULT_PREFIX.to_string(),
            lease_ttl: DEFAULT_LEASE_TTL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tls: None,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.endpoints.is_empty() {
            return Err(RegistryError::InvalidConfig(
                "registry.endpoints must not be empty".to_string(),
            ));
        }
        if self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(RegistryError::InvalidConfig(
                "registry.endpoints contains an empty entry".to_string(),
            ));
        }
        if !self.prefix.starts_with('/') {
            return Err(RegistryError::InvalidConfig(format!(
                "registry.prefix must start with '/', got '{}'",
                self.prefix
            )));
        }
        // etcd rejects leases shorter than its own minimum.
        if self.lease_ttl < Duration::from_secs(2) {
            return Err(RegistryError::InvalidConfig(
                "registry.lease_ttl must be at least 2s".to_string(),
            ));
        }
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        Ok(())
    }
}

/// TLS material for the registry connection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Server name override for certificate validation.
    pub domain: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

impl TlsConfig {
    fn validate(&self) -> Result<(), RegistryError> {
        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(RegistryError::InvalidConfig(
                "registry.tls.cert_file and key_file must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse `"250ms"`, `"30s"`, `"5m"` or `"2h"`; a bare number means seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let parse = |v: &str| {
        v.trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid duration value: '{s}'"))
    };

    if let Some(v) = s.strip_suffix("ms") {
        parse(v).map(Duration::from_millis)
    } else if let Some(v) = s.strip_suffix('h') {
        parse(v).map(|h| Duration::from_secs(h * 3600))
    } else if let Some(v) = s.strip_suffix('m') {
        parse(v).map(|m| Duration::from_secs(m * 60))
    } else if let Some(v) = s.strip_suffix('s') {
        parse(v).map(Duration::from_secs)
    } else {
        parse(s).map(Duration::from_secs)
    }
}

/// Serde adapter over [`parse_duration`] for duration-typed config fields.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}
