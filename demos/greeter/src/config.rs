//! Configuration for the greeter binaries.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use sextant_registry::{RegistryConfig, deserialize_duration};
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "GREETER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "greeter.toml";
const DEFAULT_HTTP_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8000));
const DEFAULT_GRPC_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9000));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// Settings for both greeter binaries, merged from an optional TOML file
/// and `GREETER_*` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GreeterConfig {
    pub app: AppConfig,
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub log: LogConfig,
    pub client: ClientConfig,
}

impl GreeterConfig {
    /// Load from the TOML file named by `GREETER_CONFIG` (optional, default
    /// `greeter.toml`) with `GREETER_*` overrides, then validate.
    ///
    /// Sections nest with a double underscore, e.g.
    /// `GREETER_REGISTRY__ENDPOINTS='["http://127.0.0.1:2379"]'`.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("GREETER_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could not possibly serve, before any
    /// port is bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if self.server.http_addr == self.server.grpc_addr {
            return Err(ConfigError::Invalid(format!(
                "server.http_addr and server.grpc_addr are both {}",
                self.server.http_addr
            )));
        }
        if !self.server.metrics_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.metrics_path must start with '/', got '{}'",
                self.server.metrics_path
            )));
        }
        if self.client.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "client.interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Identity and shutdown budget of the application.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "helloworld".to_string(),
            version: "1.0.0".to_string(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Listen addresses and the metrics route of the server binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub grpc_addr: SocketAddr,
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR,
            grpc_addr: DEFAULT_GRPC_ADDR,
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// Log file destination; used by the server binary only.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/logs/hello.log"),
        }
    }
}

/// Caller identity and pacing of the client binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Logical service name to resolve.
    pub service: String,

    /// Name sent in each greet call.
    pub name: String,

    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,

    /// Bounded wait for the service to appear in the registry.
    #[serde(deserialize_with = "deserialize_duration")]
    pub resolve_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service: "helloworld".to_string(),
            name: "kratos".to_string(),
            interval: Duration::from_secs(1),
            resolve_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> GreeterConfig {
        Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .expect("config should parse")
    }

    #[test]
    fn defaults_cover_everything_but_endpoints() {
        let config = from_toml(
            r#"
            [registry]
            endpoints = ["http://127.0.0.1:2379"]
            "#,
        );
        config.validate().unwrap();

        assert_eq!(config.app.name, "helloworld");
        assert_eq!(config.app.version, "1.0.0");
        assert_eq!(config.server.http_addr.port(), 8000);
        assert_eq!(config.server.grpc_addr.port(), 9000);
        assert_eq!(config.server.metrics_path, "/metrics");
        assert_eq!(config.log.path, PathBuf::from("/logs/hello.log"));
        assert_eq!(config.client.service, "helloworld");
        assert_eq!(config.client.name, "kratos");
        assert_eq!(config.client.interval, Duration::from_secs(1));
        assert_eq!(config.client.resolve_timeout, Duration::from_secs(10));
    }

    #[test]
    fn sections_override_defaults() {
        let config = from_toml(
            r#"
            [app]
            name = "greeter"
            shutdown_timeout = "3s"

            [server]
            http_addr = "0.0.0.0:18000"
            grpc_addr = "0.0.0.0:19000"

            [registry]
            endpoints = ["http://registry:2379"]
            lease_ttl = "45s"

            [client]
            name = "atreus"
            interval = "250ms"
            "#,
        );
        config.validate().unwrap();

        assert_eq!(config.app.name, "greeter");
        assert_eq!(config.app.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.server.http_addr.port(), 18000);
        assert_eq!(config.registry.lease_ttl, Duration::from_secs(45));
        assert_eq!(config.client.name, "atreus");
        assert_eq!(config.client.interval, Duration::from_millis(250));
    }

    #[test]
    fn missing_endpoints_fail_validation() {
        let err = GreeterConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("endpoints"));
    }

    #[test]
    fn clashing_listen_addrs_fail_validation() {
        let config = from_toml(
            r#"
            [server]
            http_addr = "127.0.0.1:7000"
            grpc_addr = "127.0.0.1:7000"

            [registry]
            endpoints = ["http://127.0.0.1:2379"]
            "#,
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("grpc_addr"));
    }

    #[test]
    fn relative_metrics_path_fails_validation() {
        let config = from_toml(
            r#"
            [server]
            metrics_path = "metrics"

            [registry]
            endpoints = ["http://127.0.0.1:2379"]
            "#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_fails_validation() {
        let config = from_toml(
            r#"
            [registry]
            endpoints = ["http://127.0.0.1:2379"]

            [client]
            interval = "0s"
            "#,
        );
        assert!(config.validate().is_err());
    }
}
