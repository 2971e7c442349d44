//! Greeter server: registers with the registry and serves the greeting
//! over HTTP and gRPC.

use std::sync::Arc;

use anyhow::Context;
use greeter_demo::config::GreeterConfig;
use greeter_demo::http;
use greeter_demo::pb::greeter_server::GreeterServer;
use greeter_demo::service::GreeterService;
use sextant_app::{App, init_logging};
use sextant_registry::EtcdRegistry;
use sextant_transport::{GrpcServer, HttpServer, RequestMetrics};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GreeterConfig::load().context("loading configuration")?;
    let _guard = init_logging(Some(&config.log.path))?;

    info!(
        app = %config.app.name,
        http = %config.server.http_addr,
        grpc = %config.server.grpc_addr,
        "Greeter server starting"
    );

    let registry = EtcdRegistry::connect(config.registry.clone())
        .await
        .context("connecting to the registry")?;

    let metrics = RequestMetrics::new()?;

    let http_server = HttpServer::bind(
        config.server.http_addr,
        http::router(),
        &metrics,
        &config.server.metrics_path,
    )
    .await?;

    let grpc_server = GrpcServer::bind(config.server.grpc_addr, &metrics)
        .await?
        .add_service(GreeterServer::new(GreeterService));

    let app = App::builder(config.app.name.clone())
        .version(config.app.version.clone())
        .registrar(Arc::new(registry))
        .server(http_server)
        .server(grpc_server)
        .shutdown_timeout(config.app.shutdown_timeout)
        .build();

    app.run().await?;
    Ok(())
}
