//! HTTP surface of the greeter.

use axum::extract::Path;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::service::greet;

/// JSON reply body of the greet route; the client decodes into the same
/// type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreetReply {
    pub message: String,
}

/// Router exposing `GET /helloworld/{name}`.
#[must_use]
pub fn router() -> Router {
    Router::new().route("/helloworld/{name}", get(say_hello))
}

async fn say_hello(Path(name): Path<String>) -> Json<GreetReply> {
    Json(GreetReply {
        message: greet(&name),
    })
}
