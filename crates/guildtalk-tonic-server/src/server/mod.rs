//! Server-side components of the `guildtalk` gRPC service.
//!
//! - [`config`] - CLI/environment settings validated into [`config::ServerConfig`].
//! - [`service`] - the `ChatGateway` implementation wrapping the bot.
//! - [`telemetry`] - console logging plus optional OpenTelemetry export.

pub mod config;
pub mod service;
pub mod telemetry;
