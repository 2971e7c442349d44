//! Demo pairing an HTTP+gRPC greeter server with a polling client, wired
//! together through the sextant registry.

pub mod config;
pub mod http;
pub mod pb;
pub mod service;
