//! Cross-cutting call middleware: panic recovery, request logging, metrics.
//!
//! The chain wraps every server-side call as metrics(logging(recovery(handler))).
//! Recovery sits closest to the handler so that a recovered panic still flows
//! through logging and metrics as an ordinary failed call. Both observing
//! layers derive the operation and status through the helpers below, so their
//! outputs always agree for the same call.

pub mod logging;
pub mod metrics;
pub mod recovery;

use http::{Request, Response};
use sextant_registry::Scheme;

pub use logging::RequestLogLayer;
pub use metrics::{MetricsLayer, RequestMetrics};
pub use recovery::RecoveryLayer;

/// Outcome of one call, as observed by logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallStatus {
    pub code: u16,
    pub reason: &'static str,
    /// True when the server side failed (HTTP 5xx, gRPC non-OK).
    pub failed: bool,
}

/// The operation label for a request: the URI path, which for gRPC is the
/// full `/package.Service/Method` rpc path.
pub(crate) fn operation_of<B>(req: &Request<B>) -> String {
    req.uri().path().to_string()
}

pub(crate) fn status_of<B>(scheme: Scheme, res: &Response<B>) -> CallStatus {
    match scheme {
        Scheme::Http => {
            let status = res.status();
            CallStatus {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown"),
                failed: status.is_server_error(),
            }
        }
        Scheme::Grpc => {
            let code = grpc_status_code(res);
            CallStatus {
                code,
                reason: grpc_code_name(code),
                failed: code != 0,
            }
        }
    }
}

/// Read the gRPC status from the response headers. Unary errors are sent as
/// trailers-only responses whose status lives in the header block; a missing
/// header therefore means the call is going to complete OK.
fn grpc_status_code<B>(res: &Response<B>) -> u16 {
    res.headers()
        .get("grpc-status")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(0)
}

pub(crate) const fn grpc_code_name(code: u16) -> &'static str {
    match code {
        0 => "ok",
        1 => "cancelled",
        2 => "unknown",
        3 => "invalid_argument",
        4 => "deadline_exceeded",
        5 => "not_found",
        6 => "already_exists",
        7 => "permission_denied",
        8 => "resource_exhausted",
        9 => "failed_precondition",
        10 => "aborted",
        11 => "out_of_range",
        12 => "unimplemented",
        13 => "internal",
        14 => "unavailable",
        15 => "data_loss",
        16 => "unauthenticated",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::StatusCode;

    #[test]
    fn operation_is_the_request_path() {
        let req = Request::builder()
            .uri("http://127.0.0.1:8000/helloworld/kratos?verbose=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(operation_of(&req), "/helloworld/kratos");

        let rpc = Request::builder()
            .uri("/helloworld.v1.Greeter/SayHello")
            .body(Body::empty())
            .unwrap();
        assert_eq!(operation_of(&rpc), "/helloworld.v1.Greeter/SayHello");
    }

    #[test]
    fn http_status_maps_code_and_reason() {
        let ok = Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            status_of(Scheme::Http, &ok),
            CallStatus {
                code: 200,
                reason: "OK",
                failed: false
            }
        );

        let boom = Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::empty())
            .unwrap();
        let status = status_of(Scheme::Http, &boom);
        assert!(status.failed);
        assert_eq!(status.code, 500);
    }

    #[test]
    fn client_errors_are_not_server_failures() {
        let not_found = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap();
        assert!(!status_of(Scheme::Http, &not_found).failed);
    }

    #[test]
    fn grpc_status_comes_from_the_header_block() {
        let failed = Response::builder()
            .status(StatusCode::OK)
            .header("grpc-status", "13")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            status_of(Scheme::Grpc, &failed),
            CallStatus {
                code: 13,
                reason: "internal",
                failed: true
            }
        );

        // No header: status will arrive in the trailers, the call is OK.
        let ok = Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            status_of(Scheme::Grpc, &ok),
            CallStatus {
                code: 0,
                reason: "ok",
                failed: false
            }
        );
    }

    #[test]
    fn grpc_code_names_cover_the_full_range() {
        assert_eq!(grpc_code_name(0), "ok");
        assert_eq!(grpc_code_name(13), "internal");
        assert_eq!(grpc_code_name(16), "unauthenticated");
        assert_eq!(grpc_code_name(99), "unknown");
    }
}
