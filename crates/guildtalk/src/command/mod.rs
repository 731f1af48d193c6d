//! Chat command surface.
//!
//! The transport forwards each command as an [`Invocation`]: the raw command
//! name, the free-text argument and what the author is allowed to do. The
//! [`Bot`] gates it by guild and permission, parses the argument into a
//! [`Command`] and drives the [`crate::Coordinator`].

mod dispatch;

pub use dispatch::{Bot, BotSettings, Outcome};

use crate::{
    Error, Result,
    config::{GenerationConfig, GuildId},
};
use core::{fmt, str::FromStr};

/// A permission a command may require from its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    None,
    ManageMessages,
    Administrator,
}

/// What the invoking author holds in the guild, as reported by the
/// transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub manage_messages: bool,
    pub administrator: bool,
}

impl Permissions {
    pub const ADMINISTRATOR: Self = Self {
        manage_messages: false,
        administrator: true,
    };
    pub const MODERATOR: Self = Self {
        manage_messages: true,
        administrator: false,
    };

    /// Administrators hold every permission.
    pub const fn allows(self, required: Permission) -> bool {
        if self.administrator {
            return true;
        }
        match required {
            Permission::None => true,
            Permission::ManageMessages => self.manage_messages,
            Permission::Administrator => false,
        }
    }
}

/// One inbound command event.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Guild the command was issued in; `None` for direct messages.
    pub guild_id: Option<GuildId>,
    /// Display name of the author, used in permission denials.
    pub author: String,
    /// Command name without the prefix, any case.
    pub command: String,
    /// Everything after the command name, if anything.
    pub argument: Option<String>,
    pub permissions: Permissions,
    /// Guilds the bot currently belongs to; consulted by `init`.
    pub guild_ids: Vec<GuildId>,
}

/// Command names, resolved before the argument is looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Init,
    Talk,
    DebugTalk,
    GetConfig,
    HelpConfig,
    SetConfig,
    DebugSetConfig,
    Default,
}

impl CommandKind {
    pub const ALL: [Self; 8] = [
        Self::Init,
        Self::Talk,
        Self::DebugTalk,
        Self::GetConfig,
        Self::HelpConfig,
        Self::SetConfig,
        Self::DebugSetConfig,
        Self::Default,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Talk => "talk",
            Self::DebugTalk => "debugtalk",
            Self::GetConfig => "getconfig",
            Self::HelpConfig => "helpconfig",
            Self::SetConfig => "setconfig",
            Self::DebugSetConfig => "debugsetconfig",
            Self::Default => "default",
        }
    }

    pub const fn required_permission(self) -> Permission {
        match self {
            Self::Init | Self::Talk => Permission::None,
            Self::DebugTalk
            | Self::GetConfig
            | Self::HelpConfig
            | Self::SetConfig
            | Self::Default => Permission::ManageMessages,
            Self::DebugSetConfig => Permission::Administrator,
        }
    }

    /// Everything but `init` needs a guild to act on.
    pub const fn guild_only(self) -> bool {
        !matches!(self, Self::Init)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))
    }
}

/// A fully parsed command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Init,
    /// `prompt` is `None` when the author gave no text; generation is then
    /// unconditioned.
    Talk { prompt: Option<String> },
    DebugTalk { prompt: Option<String> },
    GetConfig,
    HelpConfig,
    SetConfig(GenerationConfig),
    DebugSetConfig(GenerationConfig),
    Default,
}

impl Command {
    /// Parses the argument for `kind`.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingArgument`] if a configuration value is absent.
    /// - [`Error::InvalidArgument`] if one does not parse or extra values
    ///   follow.
    pub fn parse(kind: CommandKind, argument: Option<&str>) -> Result<Self> {
        let prompt = || {
            argument
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };
        Ok(match kind {
            CommandKind::Init => Self::Init,
            CommandKind::Talk => Self::Talk { prompt: prompt() },
            CommandKind::DebugTalk => Self::DebugTalk { prompt: prompt() },
            CommandKind::GetConfig => Self::GetConfig,
            CommandKind::HelpConfig => Self::HelpConfig,
            CommandKind::SetConfig => Self::SetConfig(parse_config(argument)?),
            CommandKind::DebugSetConfig => Self::DebugSetConfig(parse_config(argument)?),
            CommandKind::Default => Self::Default,
        })
    }

    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Init => CommandKind::Init,
            Self::Talk { .. } => CommandKind::Talk,
            Self::DebugTalk { .. } => CommandKind::DebugTalk,
            Self::GetConfig => CommandKind::GetConfig,
            Self::HelpConfig => CommandKind::HelpConfig,
            Self::SetConfig(_) => CommandKind::SetConfig,
            Self::DebugSetConfig(_) => CommandKind::DebugSetConfig,
            Self::Default => CommandKind::Default,
        }
    }
}

/// `<nsamples> <length> <temperature> <topk> <model>`, separated by
/// whitespace and/or commas.
fn parse_config(argument: Option<&str>) -> Result<GenerationConfig> {
    let mut values = argument
        .unwrap_or_default()
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|value| !value.is_empty());
    let mut next = |name: &'static str| values.next().ok_or(Error::MissingArgument(name));

    let config = GenerationConfig {
        nsamples: parse_value("nsamples", next("nsamples")?)?,
        length: parse_value("length", next("length")?)?,
        temperature: parse_value("temperature", next("temperature")?)?,
        top_k: parse_value("topk", next("topk")?)?,
        model_name: next("model")?.to_string(),
    };

    if let Some(extra) = values.next() {
        return Err(Error::InvalidArgument {
            reason: format!("unexpected value {extra:?} after model"),
        });
    }
    Ok(config)
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::InvalidArgument {
        reason: format!("{name} must be a number, got {value:?}"),
    })
}
