//! Process-wide mapping from guild to [`Session`].
//!
//! Sessions are handed out as [`SharedSession`]s. Generation holds the read
//! side of a session's lock for the duration of an engine call, so readers
//! such as `getconfig` are never held up by it; reconfiguration and release
//! take the write side.

use crate::{
    Error, Result,
    config::GuildId,
    engine::Engine,
    session::Session,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A session shared between the registry and in-flight work.
pub type SharedSession<E> = Arc<RwLock<Session<E>>>;

/// Guild-to-session map, populated on ready/`init` and on guild joins.
pub struct Registry<E: Engine> {
    sessions: RwLock<HashMap<GuildId, SharedSession<E>>>,
}

impl<E: Engine> Registry<E> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the whole mapping with one fresh, uninitialized session per
    /// guild.
    ///
    /// Prior sessions are not released here; they are returned so the caller
    /// can dispose of their engine resources.
    pub fn initialize_all<I>(&self, guild_ids: I) -> Vec<SharedSession<E>>
    where
        I: IntoIterator<Item = GuildId>,
    {
        let fresh: HashMap<_, _> = guild_ids
            .into_iter()
            .map(|id| (id, Arc::new(RwLock::new(Session::new(id)))))
            .collect();

        #[cfg(feature = "tracing")]
        tracing::info!(guilds = fresh.len(), "Registry initialized");

        let previous = core::mem::replace(&mut *self.sessions.write(), fresh);
        previous.into_values().collect()
    }

    /// Inserts an uninitialized session unless the guild already has one.
    ///
    /// Returns `true` if a session was created.
    pub fn on_guild_joined(&self, guild_id: GuildId) -> bool {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&guild_id) {
            return false;
        }
        sessions.insert(guild_id, Arc::new(RwLock::new(Session::new(guild_id))));

        #[cfg(feature = "tracing")]
        tracing::info!(guild = guild_id, "Spawned session for new guild");
        true
    }

    /// Releases the guild's engine resource and drops its entry.
    ///
    /// Blocks until any generation running on the session has finished.
    ///
    /// # Errors
    ///
    /// [`Error::GuildNotRegistered`] if the guild has no session.
    pub fn on_guild_left(&self, engine: &E, guild_id: GuildId) -> Result<()> {
        let session = self.remove(guild_id)?;
        session.write().release(engine);

        #[cfg(feature = "tracing")]
        tracing::info!(guild = guild_id, "Despawned session for departed guild");
        Ok(())
    }

    /// Drops the guild's entry without releasing it, returning the session.
    pub fn remove(&self, guild_id: GuildId) -> Result<SharedSession<E>> {
        self.sessions
            .write()
            .remove(&guild_id)
            .ok_or(Error::GuildNotRegistered(guild_id))
    }

    /// Looks up the guild's session.
    ///
    /// # Errors
    ///
    /// [`Error::GuildNotRegistered`] if the guild has no session.
    pub fn get(&self, guild_id: GuildId) -> Result<SharedSession<E>> {
        self.sessions
            .read()
            .get(&guild_id)
            .cloned()
            .ok_or(Error::GuildNotRegistered(guild_id))
    }

    /// Removes and returns every session.
    pub fn drain(&self) -> Vec<SharedSession<E>> {
        self.sessions.write().drain().map(|(_, s)| s).collect()
    }

    /// Registered guilds in ascending order.
    pub fn guild_ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<_> = self.sessions.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl<E: Engine> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}
