use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid registry configuration: {0}")]
    InvalidConfig(String),

    #[error("Registry operation failed: {0}")]
    Backend(String),

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    #[error("Instance is not registered")]
    NotRegistered,
}
