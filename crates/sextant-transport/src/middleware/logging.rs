//! One structured log line per completed call.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use http::{Request, Response};
use sextant_registry::Scheme;
use tower::{Layer, Service};
use tracing::{error, info};

use super::{operation_of, status_of};

/// Tower layer that logs every completed call with its operation, status
/// and latency. Failures (HTTP 5xx, gRPC non-OK) log at error level.
#[derive(Debug, Clone, Copy)]
pub struct RequestLogLayer {
    scheme: Scheme,
}

impl RequestLogLayer {
    #[must_use]
    pub const fn new(scheme: Scheme) -> Self {
        Self { scheme }
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService {
            inner,
            scheme: self.scheme,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestLogService<S> {
    inner: S,
    scheme: Scheme,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLogService<S>
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
        let operation = operation_of(&req);
        let start = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let result = inner.call(req).await;

            if let Ok(response) = &result {
                let status = status_of(scheme, response);
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                if status.failed {
                    error!(
                        kind = scheme.as_str(),
                        operation = %operation,
                        code = status.code,
                        reason = status.reason,
                        latency_ms,
                        "request failed"
                    );
                } else {
                    info!(
                        kind = scheme.as_str(),
                        operation = %operation,
                        code = status.code,
                        reason = status.reason,
                        latency_ms,
                        "request completed"
                    );
                }
            }

            result
        })
    }
}
