//! Greeter client: resolves the server through the registry and greets it
//! over HTTP and gRPC once per interval, forever.

use anyhow::Context;
use greeter_demo::config::GreeterConfig;
use greeter_demo::http::GreetReply;
use greeter_demo::pb::HelloRequest;
use greeter_demo::pb::greeter_client::GreeterClient;
use sextant_app::init_logging;
use sextant_registry::EtcdRegistry;
use sextant_transport::{HttpClient, ResolveOptions, connect_channel};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GreeterConfig::load().context("loading configuration")?;
    let _guard = init_logging(None)?;

    let registry = EtcdRegistry::connect(config.registry.clone())
        .await
        .context("connecting to the registry")?;

    let opts = ResolveOptions {
        timeout: config.client.resolve_timeout,
        ..ResolveOptions::default()
    };

    let http = HttpClient::connect(&registry, &config.client.service, &opts).await?;
    let channel = connect_channel(&registry, &config.client.service, &opts).await?;
    let mut grpc = GreeterClient::new(channel);

    info!(service = %config.client.service, "Connected, starting call loop");

    let mut ticker = tokio::time::interval(config.client.interval);
    loop {
        ticker.tick().await;

        let reply: GreetReply = http
            .get_json(&format!("/helloworld/{}", config.client.name))
            .await?;
        info!(kind = "http", message = %reply.message, "SayHello");

        let reply = grpc
            .say_hello(HelloRequest {
                name: config.client.name.clone(),
            })
            .await?
            .into_inner();
        info!(kind = "grpc", message = %reply.message, "SayHello");
    }
}
