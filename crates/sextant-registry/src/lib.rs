//! Service registration and discovery for sextant services.

mod config;
mod error;
mod etcd;
mod memory;
mod traits;
mod types;

pub use config::{DEFAULT_PREFIX, RegistryConfig, TlsConfig, deserialize_duration, parse_duration};
pub use error::RegistryError;
pub use etcd::EtcdRegistry;
pub use memory::MemoryRegistry;
pub use traits::{Discovery, Registrar};
pub use types::{Endpoint, InstanceStatus, Scheme, ServiceInstance};
