//! Per-guild text generation sessions for chat bots.
//!
//! Each guild the bot belongs to owns a [`Session`]: a generation
//! configuration plus the live engine resource built from it. The
//! [`Coordinator`] serializes every generation and reconfiguration behind one
//! process-wide busy flag and runs engine work on a dedicated thread; the
//! [`Bot`] is the command boundary a chat transport talks to.
//!
//! ```no_run
//! use guildtalk::{Bot, BotSettings, Coordinator, CoordinatorOptions, Invocation, ReplySink};
//! use guildtalk::engine::BigramEngine;
//! use std::sync::Arc;
//!
//! # async fn run() -> guildtalk::Result<()> {
//! let engine = BigramEngine::open("models").map_err(guildtalk::Error::EngineInitFailure)?;
//! let coordinator = Arc::new(Coordinator::new(engine, CoordinatorOptions::default())?);
//! coordinator.on_ready([42]).await?;
//!
//! let bot = Bot::new(coordinator, BotSettings::default());
//! let (replies, mut rx) = ReplySink::channel(8);
//! let talk = Invocation {
//!     guild_id: Some(42),
//!     author: "alice".into(),
//!     command: "talk".into(),
//!     argument: Some("Once upon a time".into()),
//!     ..Invocation::default()
//! };
//! bot.dispatch(talk, &replies).await?;
//! drop(replies);
//! while let Some(reply) = rx.recv().await {
//!     println!("{reply:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod engine;
mod error;
mod messages;
pub mod registry;
pub mod reply;
pub mod session;

pub use crate::command::{
    Bot, BotSettings, Command, CommandKind, Invocation, Outcome, Permission, Permissions,
};
pub use crate::config::{GenerationConfig, GuildId};
pub use crate::coordinator::{Coordinator, CoordinatorOptions, Verbosity};
pub use crate::engine::{Engine, EngineError, ModelCatalog, Token};
pub use crate::error::*;
pub use crate::registry::{Registry, SharedSession};
pub use crate::reply::{Reply, ReplySink};
pub use crate::session::{Session, SessionStatus};
