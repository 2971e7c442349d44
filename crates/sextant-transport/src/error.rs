use std::net::SocketAddr;
use std::time::Duration;

use http::StatusCode;
use sextant_registry::{RegistryError, Scheme};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(String),

    #[error("Discovery of '{service}' failed: {source}")]
    Discovery {
        service: String,
        #[source]
        source: RegistryError,
    },

    #[error("No instance of '{service}' appeared within {waited:?}")]
    ResolveTimeout { service: String, waited: Duration },

    #[error("Service '{service}' exposes no {scheme} endpoint")]
    MissingEndpoint { service: String, scheme: Scheme },

    #[error("Invalid uri: {0}")]
    InvalidUri(String),

    #[error("Failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected response status: {0}")]
    UnexpectedStatus(StatusCode),

    #[error("Failed to decode response body: {0}")]
    Decode(String),

    #[error("Metrics recorder setup failed: {0}")]
    Metrics(String),
}
