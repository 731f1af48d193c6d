//! Glue between the wire contract and the domain crate.
//!
//! - [`error`]: mapping of [`guildtalk::Error`] onto gRPC status codes.
//! - [`convert`]: wire messages to and from [`guildtalk`] types.

pub mod convert;
pub mod error;

pub use error::IntoStatus;
