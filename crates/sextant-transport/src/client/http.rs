//! HTTP client resolved through the registry.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use sextant_registry::{Discovery, Scheme};
use tracing::debug;

use super::{select_endpoint, wait_for_service, ResolveOptions};
use crate::error::TransportError;

/// A pooled HTTP/1.1 client pinned to one discovered service endpoint.
#[derive(Clone)]
pub struct HttpClient {
    base: String,
    inner: Client<HttpConnector, Full<Bytes>>,
}

impl HttpClient {
    /// Resolve `service` through the registry and pin this client to its
    /// first healthy HTTP endpoint.
    pub async fn connect(
        discovery: &dyn Discovery,
        service: &str,
        opts: &ResolveOptions,
    ) -> Result<Self, TransportError> {
        let instances = wait_for_service(discovery, service, opts).await?;
        let endpoint = select_endpoint(&instances, service, Scheme::Http)?;
        debug!(service, endpoint = %endpoint, "resolved HTTP endpoint");
        Ok(Self::direct(format!("http://{}", endpoint.addr())))
    }

    /// Build a client for a known base URL, bypassing discovery.
    #[must_use]
    pub fn direct(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            inner: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// GET `path` and decode the JSON response body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(format!("{}{}", self.base, path))
            .body(Full::new(Bytes::new()))
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let resp = self
            .inner
            .request(req)
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::UnexpectedStatus(status));
        }

        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?
            .to_bytes();
        serde_json::from_slice(&bytes).map_err(|err| TransportError::Decode(err.to_string()))
    }
}
