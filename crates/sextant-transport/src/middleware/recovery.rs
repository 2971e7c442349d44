//! Panic recovery: converts handler panics into error responses.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use sextant_registry::Scheme;
use tower::{Layer, Service};
use tracing::error;

/// Tower layer that stops handler panics from tearing the server down.
///
/// Panics are caught in both phases (the synchronous `call` and the polled
/// future) and rendered as HTTP 500 or gRPC `Internal`, depending on the
/// protocol the layer was built for. Sits innermost in the chain, so the
/// logging and metrics layers above it observe the converted response.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryLayer {
    scheme: Scheme,
}

impl RecoveryLayer {
    #[must_use]
    pub const fn new(scheme: Scheme) -> Self {
        Self { scheme }
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService {
            inner,
            scheme: self.scheme,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryService<S> {
    inner: S,
    scheme: Scheme,
}

/// Response bodies a recovered panic can be rendered into.
pub trait RecoveryBody {
    fn from_static(text: &'static str) -> Self;
}

impl RecoveryBody for axum::body::Body {
    fn from_static(text: &'static str) -> Self {
        Self::from(text)
    }
}

impl RecoveryBody for tonic::body::Body {
    // gRPC carries the error in the grpc-status/grpc-message headers; the
    // body of a trailers-only response stays empty.
    fn from_static(_text: &'static str) -> Self {
        Self::empty()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RecoveryService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: RecoveryBody + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let scheme = self.scheme;
        let operation = super::operation_of(&req);

        match std::panic::catch_unwind(AssertUnwindSafe(|| self.inner.call(req))) {
            Ok(future) => Box::pin(async move {
                match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Ok(recovered(scheme, &operation, panic.as_ref())),
                }
            }),
            Err(panic) => {
                let response = recovered(scheme, &operation, panic.as_ref());
                Box::pin(std::future::ready(Ok(response)))
            }
        }
    }
}

fn recovered<B: RecoveryBody>(
    scheme: Scheme,
    operation: &str,
    panic: &(dyn Any + Send),
) -> Response<B> {
    error!(
        kind = scheme.as_str(),
        operation = %operation,
        panic = %panic_message(panic),
        "handler panicked; converted to an error response"
    );

    match scheme {
        Scheme::Http => {
            let mut res = Response::new(B::from_static(r#"{"error":"internal server error"}"#));
            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            res.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            res
        }
        Scheme::Grpc => {
            // Trailers-only response: gRPC status 13 (Internal) in the
            // header block, HTTP status stays 200.
            let mut res = Response::new(B::from_static(""));
            res.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
            res.headers_mut()
                .insert("grpc-status", HeaderValue::from_static("13"));
            res.headers_mut()
                .insert("grpc-message", HeaderValue::from_static("handler panicked"));
            res
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "opaque panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use tower::{ServiceExt, service_fn};

    async fn panicking(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
        panic!("boom");
    }

    async fn healthy(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
        Ok(Response::new(Body::from("fine")))
    }

    #[tokio::test]
    async fn http_panic_becomes_a_500_json_response() {
        let service = RecoveryLayer::new(Scheme::Http).layer(service_fn(panicking));

        let res = service
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            res.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("internal server error"));
    }

    #[tokio::test]
    async fn grpc_panic_becomes_a_trailers_only_internal() {
        async fn panicking_rpc(
            _req: Request<tonic::body::Body>,
        ) -> Result<Response<tonic::body::Body>, Infallible> {
            panic!("boom");
        }

        let service = RecoveryLayer::new(Scheme::Grpc).layer(service_fn(panicking_rpc));

        let res = service
            .oneshot(
                Request::builder()
                    .uri("/helloworld.v1.Greeter/SayHello")
                    .body(tonic::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("grpc-status").unwrap(), "13");
        assert_eq!(res.headers().get(CONTENT_TYPE).unwrap(), "application/grpc");
    }

    #[tokio::test]
    async fn service_survives_repeated_panics() {
        let service = RecoveryLayer::new(Scheme::Http).layer(service_fn(panicking));

        for _ in 0..3 {
            let res = service
                .clone()
                .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[tokio::test]
    async fn healthy_responses_pass_through_untouched() {
        let service = RecoveryLayer::new(Scheme::Http).layer(service_fn(healthy));

        let res = service
            .oneshot(Request::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"fine");
    }

    #[tokio::test]
    async fn panic_in_the_synchronous_call_phase_is_caught() {
        #[derive(Clone)]
        struct PanicsOnCall;

        impl Service<Request<Body>> for PanicsOnCall {
            type Response = Response<Body>;
            type Error = Infallible;
            type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _req: Request<Body>) -> Self::Future {
                panic!("sync boom");
            }
        }

        let service = RecoveryLayer::new(Scheme::Http).layer(PanicsOnCall);
        let res = service
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
