//! Application supervisor.
//!
//! An [`App`] owns a set of protocol servers, announces their endpoints as
//! one service instance, and drives the group through an ordered lifecycle:
//! register, serve, drain, deregister.

use std::sync::Arc;
use std::time::Duration;

use sextant_registry::{Registrar, ServiceInstance};
use sextant_transport::{Server, TransportError};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::lifecycle::Lifecycle;
use crate::signal::shutdown_signal;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for [`App`].
pub struct AppBuilder {
    name: String,
    version: String,
    registrar: Option<Arc<dyn Registrar>>,
    servers: Vec<Box<dyn Server>>,
    shutdown_timeout: Duration,
}

impl AppBuilder {
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Registry to announce this instance in. Without one the app only
    /// serves; nothing is advertised.
    #[must_use]
    pub fn registrar(mut self, registrar: Arc<dyn Registrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    #[must_use]
    pub fn server(mut self, server: impl Server + 'static) -> Self {
        self.servers.push(Box::new(server));
        self
    }

    /// Budget for draining servers once shutdown starts.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> App {
        let (state_tx, _) = watch::channel(Lifecycle::Created);
        App {
            name: self.name,
            version: self.version,
            registrar: self.registrar,
            servers: self.servers,
            shutdown_timeout: self.shutdown_timeout,
            cancel: CancellationToken::new(),
            state_tx,
        }
    }
}

/// A named group of servers registered as one service instance.
pub struct App {
    name: String,
    version: String,
    registrar: Option<Arc<dyn Registrar>>,
    servers: Vec<Box<dyn Server>>,
    shutdown_timeout: Duration,
    cancel: CancellationToken,
    state_tx: watch::Sender<Lifecycle>,
}

impl App {
    pub fn builder(name: impl Into<String>) -> AppBuilder {
        AppBuilder {
            name: name.into(),
            version: "0.0.0".to_string(),
            registrar: None,
            servers: Vec::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Token for external shutdown triggers.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Watch the lifecycle as it advances; subscribe before `run`.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<Lifecycle> {
        self.state_tx.subscribe()
    }

    /// Register, serve until a shutdown trigger, then drain and deregister.
    ///
    /// Shutdown triggers are Ctrl+C, SIGTERM, the cancel token, or any
    /// server exiting on its own. Registration failures are fatal before
    /// anything serves; deregistration failures are logged, not returned.
    /// Returns the first server failure, if any.
    pub async fn run(mut self) -> Result<(), AppError> {
        let instance = self.instance();
        info!(
            app = %self.name,
            version = %self.version,
            id = %instance.id,
            servers = self.servers.len(),
            "Application starting"
        );

        if let Some(registrar) = &self.registrar {
            registrar
                .register(&instance)
                .await
                .map_err(|source| AppError::Register { source })?;
            self.set_state(Lifecycle::Registered);
        }

        let mut handles: Vec<(&'static str, JoinHandle<Result<(), TransportError>>)> = Vec::new();
        for server in self.servers.drain(..) {
            let endpoint = server.endpoint();
            let name = endpoint.scheme.as_str();
            let cancel = self.cancel.clone();
            handles.push((name, tokio::spawn(server.serve(cancel))));
            info!(server = name, endpoint = %endpoint, "Server spawned");
        }

        self.set_state(Lifecycle::Running);

        let mut failure: Option<AppError> = None;
        tokio::select! {
            () = shutdown_signal() => {}
            () = self.cancel.cancelled() => {
                info!("Shutdown requested");
            }
            exited = wait_for_any_exit(&mut handles) => {
                let (name, result) = exited;
                failure = server_outcome(name, result);
            }
        }

        self.set_state(Lifecycle::ShuttingDown);
        self.cancel.cancel();

        let deadline = Instant::now() + self.shutdown_timeout;
        for (name, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(result) => {
                    let outcome = server_outcome(name, result);
                    if failure.is_none() {
                        failure = outcome;
                    }
                }
                Err(_) => {
                    warn!(server = name, "Server did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        if let Some(registrar) = &self.registrar {
            if let Err(err) = registrar.deregister(&instance).await {
                warn!(app = %self.name, error = %err, "Deregistration failed");
            }
        }

        self.set_state(Lifecycle::Stopped);
        info!(app = %self.name, "Application stopped");

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn instance(&self) -> ServiceInstance {
        let mut instance = ServiceInstance::new(self.name.as_str(), self.version.as_str());
        for server in &self.servers {
            instance = instance.with_endpoint(server.endpoint());
        }
        instance
    }

    fn set_state(&self, state: Lifecycle) {
        debug!(state = %state, "Lifecycle transition");
        self.state_tx.send_replace(state);
    }
}

fn server_outcome(
    name: &'static str,
    result: Result<Result<(), TransportError>, JoinError>,
) -> Option<AppError> {
    match result {
        Ok(Ok(())) => {
            info!(server = name, "Server exited");
            None
        }
        Ok(Err(source)) => {
            error!(server = name, error = %source, "Server failed");
            Some(AppError::Server {
                name: name.to_string(),
                source,
            })
        }
        Err(err) => {
            error!(server = name, error = %err, "Server task panicked");
            Some(AppError::Server {
                name: name.to_string(),
                source: TransportError::Serve(format!("task panicked: {err}")),
            })
        }
    }
}

/// Resolve when any server task finishes, removing it from `handles`.
/// Pends forever if there are no servers.
async fn wait_for_any_exit(
    handles: &mut Vec<(&'static str, JoinHandle<Result<(), TransportError>>)>,
) -> (&'static str, Result<Result<(), TransportError>, JoinError>) {
    if handles.is_empty() {
        std::future::pending::<()>().await;
    }

    loop {
        for i in 0..handles.len() {
            if handles[i].1.is_finished() {
                let (name, handle) = handles.remove(i);
                let result = handle.await;
                return (name, result);
            }
        }
        // Small yield to avoid a busy loop
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sextant_registry::{
        Discovery, Endpoint, InstanceStatus, MemoryRegistry, RegistryError, Scheme,
    };

    struct IdleServer {
        endpoint: Endpoint,
    }

    #[async_trait]
    impl Server for IdleServer {
        fn endpoint(&self) -> Endpoint {
            self.endpoint.clone()
        }

        async fn serve(self: Box<Self>, shutdown: CancellationToken) -> Result<(), TransportError> {
            shutdown.cancelled().await;
            Ok(())
        }
    }

    struct FailingServer {
        endpoint: Endpoint,
    }

    #[async_trait]
    impl Server for FailingServer {
        fn endpoint(&self) -> Endpoint {
            self.endpoint.clone()
        }

        async fn serve(
            self: Box<Self>,
            _shutdown: CancellationToken,
        ) -> Result<(), TransportError> {
            Err(TransportError::Serve("listener blew up".to_string()))
        }
    }

    struct RejectingRegistrar;

    #[async_trait]
    impl Registrar for RejectingRegistrar {
        async fn register(&self, _instance: &ServiceInstance) -> Result<(), RegistryError> {
            Err(RegistryError::Backend("registry offline".to_string()))
        }

        async fn deregister(&self, _instance: &ServiceInstance) -> Result<(), RegistryError> {
            Ok(())
        }
    }

    fn http_endpoint() -> Endpoint {
        Endpoint::new(Scheme::Http, "127.0.0.1", 8000)
    }

    fn grpc_endpoint() -> Endpoint {
        Endpoint::new(Scheme::Grpc, "127.0.0.1", 9000)
    }

    #[tokio::test]
    async fn runs_through_the_full_lifecycle() {
        let registry = Arc::new(MemoryRegistry::new());
        let app = App::builder("helloworld")
            .version("1.0.0")
            .registrar(registry.clone())
            .server(IdleServer {
                endpoint: http_endpoint(),
            })
            .server(IdleServer {
                endpoint: grpc_endpoint(),
            })
            .build();

        let mut state = app.state();
        let cancel = app.cancel_token();
        let run = tokio::spawn(app.run());

        state.wait_for(|s| *s == Lifecycle::Running).await.unwrap();

        let instances = registry.resolve("helloworld").await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].version, "1.0.0");
        assert_eq!(instances[0].endpoints.len(), 2);
        assert_eq!(instances[0].status, InstanceStatus::Up);

        cancel.cancel();
        run.await.unwrap().unwrap();

        assert_eq!(*state.borrow(), Lifecycle::Stopped);
        assert!(registry.resolve("helloworld").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn registration_failure_is_fatal() {
        let app = App::builder("helloworld")
            .registrar(Arc::new(RejectingRegistrar))
            .server(IdleServer {
                endpoint: http_endpoint(),
            })
            .build();

        let state = app.state();
        let err = app.run().await.unwrap_err();
        assert!(matches!(err, AppError::Register { .. }));
        assert_eq!(*state.borrow(), Lifecycle::Created);
    }

    #[tokio::test]
    async fn a_failing_server_brings_the_app_down() {
        let registry = Arc::new(MemoryRegistry::new());
        let app = App::builder("helloworld")
            .registrar(registry.clone())
            .server(FailingServer {
                endpoint: http_endpoint(),
            })
            .server(IdleServer {
                endpoint: grpc_endpoint(),
            })
            .build();

        let err = app.run().await.unwrap_err();
        match err {
            AppError::Server { name, .. } => assert_eq!(name, "http"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.resolve("helloworld").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn apps_without_a_registrar_still_serve() {
        let app = App::builder("helloworld")
            .server(IdleServer {
                endpoint: http_endpoint(),
            })
            .build();

        let mut state = app.state();
        let cancel = app.cancel_token();
        let run = tokio::spawn(app.run());

        state.wait_for(|s| *s == Lifecycle::Running).await.unwrap();
        cancel.cancel();
        run.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), Lifecycle::Stopped);
    }
}
