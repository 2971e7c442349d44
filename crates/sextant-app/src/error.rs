use sextant_registry::RegistryError;
use sextant_transport::TransportError;
use thiserror::Error;

/// Errors from application startup and shutdown.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Service registration failed: {source}")]
    Register { source: RegistryError },

    #[error("Server '{name}' failed: {source}")]
    Server {
        name: String,
        source: TransportError,
    },
}
