//! Request metrics: an explicitly owned Prometheus collector and the layer
//! that feeds it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use http::{Request, Response};
use metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use sextant_registry::Scheme;
use tower::{Layer, Service};

use super::{CallStatus, operation_of, status_of};
use crate::error::TransportError;

/// Per-call counter, labelled {kind, operation, code, reason}.
pub const REQUESTS_TOTAL: &str = "requests_code_total";

/// Per-call duration histogram, labelled {kind, operation}.
pub const REQUEST_DURATION_SECONDS: &str = "requests_duration_seconds";

/// Histogram buckets for request duration, in seconds.
pub const DURATION_BUCKETS: [f64; 8] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Explicitly constructed metrics collector.
///
/// Owns its Prometheus recorder instead of installing a process-global one:
/// whoever assembles the servers decides which collector they feed, and two
/// collectors never see each other's samples.
#[derive(Clone)]
pub struct RequestMetrics {
    recorder: Arc<PrometheusRecorder>,
}

impl RequestMetrics {
    pub fn new() -> Result<Self, TransportError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets(&DURATION_BUCKETS)
            .map_err(|e| TransportError::Metrics(e.to_string()))?
            .build_recorder();
        Ok(Self {
            recorder: Arc::new(recorder),
        })
    }

    #[must_use]
    pub fn handle(&self) -> PrometheusHandle {
        self.recorder.handle()
    }

    /// Render the Prometheus exposition text for this collector.
    #[must_use]
    pub fn render(&self) -> String {
        self.recorder.handle().render()
    }

    pub(crate) fn record(
        &self,
        scheme: Scheme,
        operation: &str,
        status: CallStatus,
        elapsed_secs: f64,
    ) {
        let metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

        let counter = Key::from_parts(
            REQUESTS_TOTAL,
            vec![
                Label::new("kind", scheme.as_str()),
                Label::new("operation", operation.to_string()),
                Label::new("code", status.code.to_string()),
                Label::new("reason", status.reason),
            ],
        );
        self.recorder
            .register_counter(&counter, &metadata)
            .increment(1);

        let duration = Key::from_parts(
            REQUEST_DURATION_SECONDS,
            vec![
                Label::new("kind", scheme.as_str()),
                Label::new("operation", operation.to_string()),
            ],
        );
        self.recorder
            .register_histogram(&duration, &metadata)
            .record(elapsed_secs);
    }
}

/// Router exposing this collector's Prometheus text endpoint.
pub fn metrics_router(path: &str, metrics: &RequestMetrics) -> Router {
    let handle = metrics.handle();
    Router::new().route(
        path,
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

/// Tower layer that records one counter increment and one duration sample
/// per completed call.
#[derive(Clone)]
pub struct MetricsLayer {
    metrics: RequestMetrics,
    scheme: Scheme,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(metrics: RequestMetrics, scheme: Scheme) -> Self {
        Self { metrics, scheme }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: self.metrics.clone(),
            scheme: self.scheme,
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: RequestMetrics,
    scheme: Scheme,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let scheme = self.scheme;
        let metrics = self.metrics.clone();
        let operation = operation_of(&req);
        let start = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let result = inner.call(req).await;

            if let Ok(response) = &result {
                let status = status_of(scheme, response);
                metrics.record(scheme, &operation, status, start.elapsed().as_secs_f64());
            }

            result
        })
    }
}
