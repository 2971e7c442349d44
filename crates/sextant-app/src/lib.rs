//! Application lifecycle for sextant services.
//!
//! An [`App`] groups protocol servers behind one registered service
//! instance and supervises them from startup to graceful shutdown.

mod app;
mod error;
mod lifecycle;
mod logging;
mod signal;

pub use app::{App, AppBuilder};
pub use error::AppError;
pub use lifecycle::Lifecycle;
pub use logging::init_logging;
