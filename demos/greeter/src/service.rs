//! The greeting logic, shared by both protocol surfaces.

use tonic::{Request, Response, Status};
use tracing::debug;

use crate::pb::greeter_server::Greeter;
use crate::pb::{HelloReply, HelloRequest};

/// Format the fixed greeting for `name`.
#[must_use]
pub fn greet(name: &str) -> String {
    format!("Welcome {name}!")
}

/// Greeter over gRPC; the HTTP routes call [`greet`] directly.
#[derive(Debug, Clone, Default)]
pub struct GreeterService;

#[tonic::async_trait]
impl Greeter for GreeterService {
    async fn say_hello(
        &self,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        let name = request.into_inner().name;
        debug!(name = %name, "SayHello");
        Ok(Response::new(HelloReply {
            message: greet(&name),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greets_any_name() {
        assert_eq!(greet("kratos"), "Welcome kratos!");
        assert_eq!(greet(""), "Welcome !");
        assert_eq!(greet("世界"), "Welcome 世界!");
    }

    #[tokio::test]
    async fn say_hello_uses_the_shared_template() {
        let reply = GreeterService
            .say_hello(Request::new(HelloRequest {
                name: "kratos".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.message, "Welcome kratos!");
    }
}
