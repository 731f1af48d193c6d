//! One guild's generation configuration and its live engine resource.
//!
//! A [`Session`] moves through a small state machine:
//!
//! ```text
//! Uninitialized --apply_configuration--> Configuring --activate--> Ready
//!       ^                                    |   ^                  |
//!       |        (build failure)             |   +--apply_config----+
//!       +------------------------------------+                      |
//!       +-------------------------release---------------------------+
//! ```
//!
//! The engine handle only exists inside the `Ready` state, so a session holds
//! a handle if and only if it is ready. Configuration and handle are stored
//! side by side and replaced together; callers share sessions behind a lock
//! (see [`crate::SharedSession`]) so nothing observes one without the other.

use crate::{
    Error, Result,
    config::{GenerationConfig, GuildId},
    engine::{Engine, Token},
};
use core::fmt;

/// Observable lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// No engine resource; generation is refused.
    Uninitialized,
    /// A configuration is stored and its resource is being built.
    Configuring,
    /// The engine resource matches the stored configuration.
    Ready,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Configuring => write!(f, "configuring"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

enum State<E: Engine> {
    Uninitialized,
    Configuring { prepared: Option<E::Prepared> },
    Ready { handle: E::Handle },
}

impl<E: Engine> State<E> {
    fn status(&self) -> SessionStatus {
        match self {
            Self::Uninitialized => SessionStatus::Uninitialized,
            Self::Configuring { .. } => SessionStatus::Configuring,
            Self::Ready { .. } => SessionStatus::Ready,
        }
    }
}

/// Generation configuration plus engine resource for a single guild.
pub struct Session<E: Engine> {
    guild_id: GuildId,
    config: GenerationConfig,
    state: State<E>,
}

impl<E: Engine> Session<E> {
    /// Creates an uninitialized session holding the baseline configuration.
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            config: GenerationConfig::default(),
            state: State::Uninitialized,
        }
    }

    pub const fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// The stored configuration. When the session is ready, the live handle
    /// was built from exactly this configuration.
    pub const fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    /// Returns the live engine handle, present only while ready.
    pub fn handle(&self) -> Option<&E::Handle> {
        match &self.state {
            State::Ready { handle } => Some(handle),
            _ => None,
        }
    }

    /// Validates `config` against the installed models and an optional cost
    /// ceiling without touching any session.
    pub fn validate(engine: &E, config: &GenerationConfig, ceiling: Option<u64>) -> Result<()> {
        config.validate_ranges()?;
        if !engine.installed_models().contains(&config.model_name) {
            return Err(Error::UnknownModel(config.model_name.clone()));
        }
        config.check_cost(ceiling)
    }

    /// Stores a new configuration and enters `Configuring`.
    ///
    /// Validation happens first; on failure nothing changes. A live handle is
    /// disposed before the new configuration is stored.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for out-of-range values.
    /// - [`Error::UnknownModel`] if the model is not installed.
    /// - [`Error::ConfigurationTooExpensive`] if `nsamples * length` exceeds
    ///   `ceiling`.
    pub fn apply_configuration(
        &mut self,
        engine: &E,
        config: GenerationConfig,
        ceiling: Option<u64>,
    ) -> Result<()> {
        Self::validate(engine, &config, ceiling)?;
        self.release(engine);
        self.config = config;
        self.state = State::Configuring { prepared: None };

        #[cfg(feature = "tracing")]
        tracing::debug!(guild = self.guild_id, config = ?self.config, "Configuration applied");
        Ok(())
    }

    /// First build phase: stages the engine resource for the stored
    /// configuration. The session stays `Configuring`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransition`] unless `Configuring`.
    /// - [`Error::EngineInitFailure`] if the engine rejects the configuration;
    ///   the session falls back to `Uninitialized`.
    pub fn prepare(&mut self, engine: &E) -> Result<()> {
        let from = self.status();
        let State::Configuring { prepared } = &mut self.state else {
            return Err(Error::InvalidTransition {
                from,
                operation: "prepare",
            });
        };
        if prepared.is_some() {
            return Ok(());
        }
        match engine.build_pre(&self.config) {
            Ok(staged) => {
                *prepared = Some(staged);
                Ok(())
            }
            Err(e) => {
                self.state = State::Uninitialized;
                Err(Error::EngineInitFailure(e))
            }
        }
    }

    /// Second build phase: constructs the live engine resource and enters
    /// `Ready`. Runs the first phase too if [`Session::prepare`] was skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransition`] unless `Configuring`.
    /// - [`Error::EngineInitFailure`] if either phase fails; the session falls
    ///   back to `Uninitialized` without a handle.
    pub fn activate(&mut self, engine: &E) -> Result<()> {
        self.prepare(engine)?;
        let prepared = match core::mem::replace(&mut self.state, State::Uninitialized) {
            State::Configuring {
                prepared: Some(prepared),
            } => prepared,
            other => {
                let from = other.status();
                self.state = other;
                return Err(Error::InvalidTransition {
                    from,
                    operation: "activate",
                });
            }
        };

        let handle = engine
            .build_session(prepared, &self.config)
            .map_err(Error::EngineInitFailure)?;
        self.state = State::Ready { handle };

        #[cfg(feature = "tracing")]
        tracing::info!(guild = self.guild_id, model = %self.config.model_name, "Session ready");
        Ok(())
    }

    /// Runs the engine once on the live handle.
    ///
    /// Returns the engine's batch of token sequences in order.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotReady`] unless `Ready`.
    /// - [`Error::GenerationFailed`] if the engine fails.
    pub fn generate_from(&self, engine: &E, prompt: Option<&[Token]>) -> Result<Vec<Vec<Token>>> {
        let State::Ready { handle } = &self.state else {
            return Err(Error::SessionNotReady {
                guild_id: self.guild_id,
                status: self.status(),
            });
        };
        engine
            .generate(handle, prompt)
            .map_err(Error::GenerationFailed)
    }

    /// Disposes the engine resource, if any, and returns to `Uninitialized`.
    /// Idempotent.
    pub fn release(&mut self, engine: &E) {
        match core::mem::replace(&mut self.state, State::Uninitialized) {
            State::Ready { handle } => {
                engine.dispose(handle);
                #[cfg(feature = "tracing")]
                tracing::info!(guild = self.guild_id, "Engine resource released");
            }
            State::Configuring { .. } | State::Uninitialized => {}
        }
    }
}

impl<E: Engine> fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("guild_id", &self.guild_id)
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}
