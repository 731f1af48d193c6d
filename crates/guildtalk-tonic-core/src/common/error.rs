//! gRPC status mapping for [`guildtalk::Error`].
//!
//! Command failures never reach the wire as statuses: the bot renders them as
//! reply messages. Statuses are produced for the membership endpoint and for
//! plumbing failures.

use guildtalk::Error;
use tonic::Status;

/// Converts a domain error into the `tonic::Status` returned to clients.
pub trait IntoStatus {
    fn into_status(self) -> Status;
}

impl IntoStatus for Error {
    fn into_status(self) -> Status {
        let message = self.to_string();
        match self {
            Error::SystemNotReady | Error::ServiceShutdown => Status::unavailable(message),
            Error::Busy => Status::resource_exhausted(message),
            Error::GuildNotRegistered(_) => Status::not_found(message),
            Error::SessionNotReady { .. } | Error::InvalidTransition { .. } => {
                Status::failed_precondition(message)
            }
            Error::UnknownModel(_)
            | Error::ConfigurationTooExpensive { .. }
            | Error::InvalidArgument { .. }
            | Error::MissingArgument(_)
            | Error::UnknownCommand(_)
            | Error::GuildRequired => Status::invalid_argument(message),
            Error::MissingPermission { .. } => Status::permission_denied(message),
            Error::EngineInitFailure(_)
            | Error::GenerationFailed(_)
            | Error::ChannelError { .. } => Status::internal(message),
            _ => Status::unknown(message),
        }
    }
}
