//! Tracing setup shared by server and client binaries.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Initialise the global tracing subscriber.
///
/// Logs go to stdout, and additionally to `file` when given. The returned
/// guard must stay alive for the file writer to flush; hold it in `main`.
pub fn init_logging(file: Option<&Path>) -> Result<Option<WorkerGuard>, AppError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match file {
        Some(path) => {
            let name = path.file_name().ok_or_else(|| {
                AppError::Logging(format!("log path '{}' has no file name", path.display()))
            })?;
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(dir).map_err(|err| {
                AppError::Logging(format!(
                    "cannot create log directory '{}': {err}",
                    dir.display()
                ))
            })?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stdout.and(writer)))
                .try_init()
                .map_err(|err| AppError::Logging(err.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .try_init()
                .map_err(|err| AppError::Logging(err.to_string()))?;
            Ok(None)
        }
    }
}
