//! The `Echo` gRPC service.
//!
//! ## Structure
//!
//! - [`gateway`] - tonic entry point (`EchoGateway`) feeding the callgate
//!   method table.
//! - [`handlers`] - the per-method handlers run on the worker pool.
//! - [`proto`] - generated protobuf messages and service traits.

pub mod gateway;
pub mod handlers;

pub use gateway::EchoGateway;

pub mod proto {
    tonic::include_proto!("callgate.echo");
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("echo_descriptor");
}
