use super::{Command, CommandKind, Invocation};
use crate::{
    Error, Result,
    config::{BASELINE_MODEL, GenerationConfig},
    coordinator::{Coordinator, Verbosity},
    engine::Engine,
    messages,
    reply::ReplySink,
};
use std::sync::Arc;

/// Deployment knobs for the command surface.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Ceiling on `nsamples * length` for `setconfig`.
    pub cost_ceiling: u64,
    /// Model restored by `default`.
    pub baseline_model: String,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            cost_ceiling: 1000,
            baseline_model: BASELINE_MODEL.to_string(),
        }
    }
}

/// How a dispatched command ended.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    /// The command failed and the error was sent to the author as a reply.
    Reported(Error),
}

/// The command boundary: validates invocations, runs them against the
/// coordinator and turns failures into replies.
pub struct Bot<E: Engine> {
    coordinator: Arc<Coordinator<E>>,
    settings: BotSettings,
}

impl<E: Engine> Bot<E> {
    pub const fn new(coordinator: Arc<Coordinator<E>>, settings: BotSettings) -> Self {
        Self {
            coordinator,
            settings,
        }
    }

    pub const fn coordinator(&self) -> &Arc<Coordinator<E>> {
        &self.coordinator
    }

    pub const fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// Runs one command, answering through `replies`.
    ///
    /// Every failure is reported to the author as a message and handed back
    /// as [`Outcome::Reported`].
    ///
    /// # Errors
    ///
    /// Only [`Error::ChannelError`], when `replies` can no longer deliver.
    pub async fn dispatch(&self, invocation: Invocation, replies: &ReplySink) -> Result<Outcome> {
        let command = invocation.command.clone();
        match self.execute(invocation, replies).await {
            Ok(()) => Ok(Outcome::Completed),
            Err(e @ Error::ChannelError { .. }) => Err(e),
            Err(e) => {
                log_failure(&command, &e);
                replies.text(error_reply(&e)).await?;
                Ok(Outcome::Reported(e))
            }
        }
    }

    async fn execute(&self, invocation: Invocation, replies: &ReplySink) -> Result<()> {
        let kind: CommandKind = invocation.command.parse()?;
        if kind.guild_only() && invocation.guild_id.is_none() {
            return Err(Error::GuildRequired);
        }
        if !invocation.permissions.allows(kind.required_permission()) {
            return Err(Error::MissingPermission {
                author: invocation.author,
            });
        }

        #[cfg(feature = "tracing")]
        tracing::info!(command = %kind, guild = ?invocation.guild_id, author = %invocation.author, "Command received");

        let command = Command::parse(kind, invocation.argument.as_deref())?;
        let guild = || invocation.guild_id.ok_or(Error::GuildRequired);
        let coordinator = &self.coordinator;

        match command {
            Command::Init => {
                let guilds = coordinator
                    .initialize_all(invocation.guild_ids.iter().copied())
                    .await?;
                replies.text(messages::initialized(guilds)).await
            }
            Command::Talk { prompt } => {
                coordinator
                    .handle_request(guild()?, prompt.as_deref(), Verbosity::Quiet, replies)
                    .await
            }
            Command::DebugTalk { prompt } => {
                coordinator
                    .handle_request(guild()?, prompt.as_deref(), Verbosity::Verbose, replies)
                    .await
            }
            Command::GetConfig => {
                let config = coordinator.config(guild()?).await?;
                replies
                    .text(messages::settings_block("Current state", &config))
                    .await
            }
            Command::HelpConfig => {
                if !coordinator.is_ready() {
                    return Err(Error::SystemNotReady);
                }
                replies
                    .text(messages::help(coordinator.engine().installed_models()))
                    .await
            }
            Command::SetConfig(config) => {
                coordinator
                    .reconfigure(
                        guild()?,
                        config,
                        Some(self.settings.cost_ceiling),
                        Verbosity::Quiet,
                        replies,
                    )
                    .await
            }
            Command::DebugSetConfig(config) => {
                coordinator
                    .reconfigure(guild()?, config, None, Verbosity::Verbose, replies)
                    .await
            }
            Command::Default => {
                let baseline = GenerationConfig::baseline(self.settings.baseline_model.as_str());
                coordinator
                    .reconfigure(guild()?, baseline, None, Verbosity::Baseline, replies)
                    .await
            }
        }
    }
}

#[cfg(feature = "tracing")]
fn log_failure(command: &str, error: &Error) {
    if error.is_validation() {
        tracing::debug!(command, error = %error, "Command rejected");
    } else {
        tracing::warn!(command, error = ?error, "Command failed");
    }
}

#[cfg(not(feature = "tracing"))]
const fn log_failure(_command: &str, _error: &Error) {}

fn error_reply(error: &Error) -> String {
    match error {
        Error::EngineInitFailure(_) => messages::configuration_failed(error),
        other => other.to_string(),
    }
}
