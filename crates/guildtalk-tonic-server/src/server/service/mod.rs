//! gRPC service implementation.
//!
//! - [`handler`] - gRPC service entry point (`GatewayService`).

pub mod handler;
