//! Generated protobuf types and service stubs.

tonic::include_proto!("helloworld.v1");
