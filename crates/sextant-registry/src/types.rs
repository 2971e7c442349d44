use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol scheme an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Grpc,
}

impl Scheme {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "grpc" => Ok(Self::Grpc),
            other => Err(format!("unknown scheme: {other}")),
        }
    }
}

/// A single network endpoint of a service instance.
///
/// Stored and transmitted as its uri form, `scheme://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// `host:port` form, as used for socket connects.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `scheme://host:port` form, as used for registration records.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.uri()
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| format!("endpoint '{s}' is missing a scheme"))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| format!("endpoint '{s}' is missing a port"))?;
        if host.is_empty() {
            return Err(format!("endpoint '{s}' is missing a host"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| format!("endpoint '{s}' has an invalid port"))?;
        Ok(Self::new(scheme.parse()?, host, port))
    }
}

/// Whether an instance should receive traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Up,
    Down,
}

/// One running, registered copy of a service.
///
/// The registry owns the authoritative record; a server keeps its own copy
/// only so it can deregister the same instance on shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub version: String,
    pub endpoints: Vec<Endpoint>,
    pub status: InstanceStatus,
}

impl ServiceInstance {
    /// Create an instance with a fresh unique id and no endpoints yet.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            version: version.into(),
            endpoints: Vec::new(),
            status: InstanceStatus::Up,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// First endpoint speaking the given scheme, if any.
    #[must_use]
    pub fn endpoint(&self, scheme: Scheme) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.scheme == scheme)
    }

    #[must_use]
    pub const fn is_up(&self) -> bool {
        matches!(self.status, InstanceStatus::Up)
    }
}
