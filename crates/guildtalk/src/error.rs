//! Error types for the guild session and generation pipeline.
//!
//! [`Error`] is the single error type surfaced by every public operation of
//! this crate. The command layer ([`crate::Bot`]) turns all of them, except
//! [`Error::ChannelError`], into user-visible replies; transports embedding
//! the [`crate::Coordinator`] directly can match on the variants instead.
//!
//! ## Error Cases
//! - `SystemNotReady`: the registry has never been populated.
//! - `Busy`: another generation or reconfiguration is in flight.
//! - `GuildNotRegistered` / `SessionNotReady`: lookup and state failures.
//! - `UnknownModel` / `ConfigurationTooExpensive` / `InvalidArgument`:
//!   configuration validation.
//! - `EngineInitFailure` / `GenerationFailed`: the model engine failed.
//! - `MissingPermission` / `MissingArgument` / `UnknownCommand` /
//!   `GuildRequired`: command boundary validation.
//! - `ChannelError` / `ServiceShutdown`: internal plumbing.

use crate::{config::GuildId, engine::EngineError, session::SessionStatus};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the guild session service.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No `init` or ready event has populated the registry yet.
    #[error("Bot has not been initialized. Please type !init to initialize the bot.")]
    SystemNotReady,

    /// The process-wide generation pathway is occupied.
    #[error("Currently talking to someone. Try again later.")]
    Busy,

    /// The guild has no session in the registry.
    #[error("Guild {0} has no session; run !init first")]
    GuildNotRegistered(GuildId),

    /// The guild's session has no live engine resource.
    #[error("Session for guild {guild_id} is not ready ({status}); configure it with !setconfig or !default")]
    SessionNotReady {
        guild_id: GuildId,
        status: SessionStatus,
    },

    /// The requested model is not installed in the model directory.
    #[error("Model {0} does not exist. Please choose a different model!")]
    UnknownModel(String),

    /// `nsamples * length` exceeds the cost ceiling.
    #[error(
        "Configuration failed. The configuration parameters are too process intensive ({cost} > {ceiling})."
    )]
    ConfigurationTooExpensive { cost: u64, ceiling: u64 },

    /// A configuration value or command argument is malformed.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A lifecycle operation was attempted from the wrong state.
    #[error("Cannot {operation} a session that is {from}")]
    InvalidTransition {
        from: SessionStatus,
        operation: &'static str,
    },

    /// Building the engine resource failed; the session is uninitialized.
    #[error("Engine initialization failed: {0}")]
    EngineInitFailure(#[source] EngineError),

    /// The engine failed while generating.
    #[error("Command failed!")]
    GenerationFailed(#[source] EngineError),

    /// The invoking author lacks the permission the command requires.
    #[error("Sorry {author}, you do not have permissions to do that!")]
    MissingPermission { author: String },

    /// A required command argument was not supplied.
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    /// The command name is not part of the command surface.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The command was issued outside of a guild.
    #[error("This command can only be used inside a guild")]
    GuildRequired,

    /// Internal channel send/receive failure (closed reply stream or worker).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The coordinator is shutting down and refuses new work.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Returns `true` for errors produced by validating input before any
    /// protected work starts.
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownModel(_)
                | Self::ConfigurationTooExpensive { .. }
                | Self::InvalidArgument { .. }
                | Self::MissingPermission { .. }
                | Self::MissingArgument(_)
                | Self::UnknownCommand(_)
                | Self::GuildRequired
        )
    }
}
