//! HTTP and gRPC transport for sextant services.
//!
//! Servers bind eagerly so their advertised endpoints are exact, wrap every
//! call in a shared metrics/logging/recovery chain, and stop on a
//! cancellation token. Clients resolve their peer through the registry
//! before connecting.

pub mod client;
pub mod error;
pub mod middleware;
pub mod server;

pub use client::{connect_channel, select_endpoint, wait_for_service, HttpClient, ResolveOptions};
pub use error::TransportError;
pub use middleware::{MetricsLayer, RecoveryLayer, RequestLogLayer, RequestMetrics};
pub use server::{GrpcServer, HttpServer, Server};
