//! gRPC contract for the `guildtalk` bot.
//!
//! A chat transport adapter (for example a Discord gateway client) talks to
//! the bot over the `ChatGateway` service defined in `proto/guildtalk.proto`.
//! This crate holds the generated bindings plus the conversions between the
//! wire types and the [`guildtalk`] domain types.

mod common;
pub use common::*;
// Public re-export so downstream crates can reach the domain crate via
// `guildtalk_tonic_core::guildtalk`
pub use guildtalk;

pub mod proto {
    tonic::include_proto!("guildtalk");
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("guildtalk_descriptor");
}
