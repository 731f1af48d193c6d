//! Generation coordinator.
//!
//! The [`Coordinator`] is the one place where requests touch engine state. It
//! owns:
//!
//! - the readiness flag, set once the registry has been populated;
//! - the process-wide busy flag, a single-flight guard shared by every guild;
//! - the dedicated generation worker, which runs every engine call so the
//!   async runtime is never blocked by inference or model construction.
//!
//! A request that finds the busy flag set fails immediately with
//! [`Error::Busy`]; nothing is queued. The flag is held through an RAII guard
//! so it is cleared on success, on error, on panic and when the request future
//! is dropped.

mod busy;
mod worker;

#[cfg(test)]
mod tests;

use crate::{
    Error, Result,
    chunk::for_transport,
    config::{GenerationConfig, GuildId},
    engine::{Engine, EngineError, Token},
    messages,
    registry::{Registry, SharedSession},
    reply::ReplySink,
    session::Session,
};
use busy::BusyFlag;
use core::time::Duration;
use portable_atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use worker::GenerationWorker;

/// Whether a command reports diagnostics alongside its normal output.
///
/// `talk`/`debugtalk` and `setconfig`/`debugsetconfig` share one
/// implementation and differ only by this flag (and the cost ceiling).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    #[default]
    Quiet,
    Verbose,
    /// Reconfiguration reports only its final outcome, as `default` does.
    Baseline,
}

/// Tunables for a [`Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Jobs that may wait for the generation worker.
    pub worker_queue: usize,
    /// How long [`Coordinator::shutdown`] waits for the worker.
    pub shutdown_timeout: Duration,
    /// `nsamples * length` above which a reconfiguration warns the user.
    pub warn_threshold: u64,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            worker_queue: 16,
            shutdown_timeout: Duration::from_secs(5),
            warn_threshold: 100,
        }
    }
}

/// Serializes generation across all guilds and drives each request end to
/// end.
pub struct Coordinator<E: Engine> {
    engine: Arc<E>,
    registry: Arc<Registry<E>>,
    worker: GenerationWorker,
    ready: AtomicBool,
    busy: BusyFlag,
    options: CoordinatorOptions,
}

impl<E: Engine> Coordinator<E> {
    /// Creates a coordinator with an empty registry and starts its worker.
    ///
    /// # Errors
    ///
    /// [`Error::ChannelError`] if the worker thread cannot be spawned.
    pub fn new(engine: E, options: CoordinatorOptions) -> Result<Self> {
        let worker = GenerationWorker::spawn(options.worker_queue, options.shutdown_timeout)?;
        Ok(Self {
            engine: Arc::new(engine),
            registry: Arc::new(Registry::new()),
            worker,
            ready: AtomicBool::new(false),
            busy: BusyFlag::default(),
            options,
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn registry(&self) -> &Registry<E> {
        &self.registry
    }

    pub const fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether a generation or reconfiguration is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.is_set()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::SystemNotReady)
        }
    }

    /// Handles the transport's "session ready" event.
    ///
    /// Populates the registry only if it has never been populated; returns
    /// whether it did. Reconnects therefore keep every guild's session.
    pub async fn on_ready<I>(&self, guild_ids: I) -> Result<bool>
    where
        I: IntoIterator<Item = GuildId>,
    {
        if self.is_ready() {
            return Ok(false);
        }
        self.initialize_all(guild_ids).await?;
        Ok(true)
    }

    /// Replaces every session with a fresh, uninitialized one per guild and
    /// marks the system ready. Returns the number of registered guilds.
    ///
    /// Engine resources of the replaced sessions are released on the worker,
    /// after any generation still using them has finished.
    pub async fn initialize_all<I>(&self, guild_ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = GuildId>,
    {
        let discarded = self.registry.initialize_all(guild_ids);
        let guilds = self.registry.len();
        self.ready.store(true, Ordering::Release);

        if !discarded.is_empty() {
            self.release_on_worker(discarded).await?;
        }
        Ok(guilds)
    }

    /// Registers a session for a guild the bot just joined. Returns `false`
    /// if the guild already had one.
    pub fn on_guild_joined(&self, guild_id: GuildId) -> bool {
        self.registry.on_guild_joined(guild_id)
    }

    /// Releases and unregisters the session of a guild the bot left.
    ///
    /// # Errors
    ///
    /// [`Error::GuildNotRegistered`] if the guild had no session.
    pub async fn on_guild_left(&self, guild_id: GuildId) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let engine = Arc::clone(&self.engine);
        self.worker
            .run(move || registry.on_guild_left(&engine, guild_id))
            .await?
    }

    /// Reads the guild's current configuration.
    ///
    /// The read happens on the blocking pool so an in-flight reconfiguration
    /// of the same session never stalls the runtime.
    pub async fn config(&self, guild_id: GuildId) -> Result<GenerationConfig> {
        self.ensure_ready()?;
        let session = self.registry.get(guild_id)?;
        tokio::task::spawn_blocking(move || session.read().config().clone())
            .await
            .map_err(|e| Error::ChannelError {
                context: format!("Configuration read failed: {e}"),
            })
    }

    /// Generates `nsamples` completions for the guild and streams each one to
    /// `replies`, prompt first, split to the transport's message size.
    ///
    /// # Errors
    ///
    /// - [`Error::SystemNotReady`] before the registry was populated.
    /// - [`Error::Busy`] while another request holds the generation pathway.
    /// - [`Error::GuildNotRegistered`] / [`Error::SessionNotReady`].
    /// - [`Error::GenerationFailed`] if the engine fails or panics.
    /// - [`Error::ChannelError`] if the transport stops listening.
    pub async fn handle_request(
        &self,
        guild_id: GuildId,
        prompt: Option<&str>,
        verbosity: Verbosity,
        replies: &ReplySink,
    ) -> Result<()> {
        self.ensure_ready()?;
        let _busy = self.busy.try_acquire().ok_or(Error::Busy)?;

        let session = self.registry.get(guild_id)?;
        let nsamples = {
            let session = session.read();
            if !session.is_ready() {
                return Err(Error::SessionNotReady {
                    guild_id,
                    status: session.status(),
                });
            }
            session.config().nsamples
        };
        let tokens: Option<Arc<[Token]>> = prompt.map(|p| Arc::from(self.engine.encode(p)));

        if verbosity == Verbosity::Verbose {
            replies.text(messages::talk_header(guild_id)).await?;
        }

        for sample in 0..nsamples {
            replies.typing().await?;
            let started = Instant::now();
            let generated = self.generate_once(&session, tokens.clone()).await?;
            let elapsed = started.elapsed();

            let reply = match prompt {
                Some(prompt) => format!("{prompt}{generated}"),
                None => generated,
            };
            if !reply.is_empty() {
                for chunk in for_transport(&reply) {
                    replies.text(chunk).await?;
                }
            }

            #[cfg(feature = "tracing")]
            tracing::info!(
                guild = guild_id,
                sample = sample + 1,
                nsamples,
                chars = reply.chars().count(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Sample generated"
            );
            #[cfg(not(feature = "tracing"))]
            let _ = sample;

            if verbosity == Verbosity::Verbose {
                replies
                    .text(messages::talk_footer(elapsed, reply.chars().count()))
                    .await?;
            }
        }
        Ok(())
    }

    /// Runs one engine call on the worker and decodes the first sequence.
    async fn generate_once(
        &self,
        session: &SharedSession<E>,
        tokens: Option<Arc<[Token]>>,
    ) -> Result<String> {
        let session = Arc::clone(session);
        let engine = Arc::clone(&self.engine);
        self.worker
            .run(move || {
                let batch = session.read().generate_from(&engine, tokens.as_deref())?;
                batch
                    .first()
                    .map(|sequence| engine.decode(sequence))
                    .ok_or_else(|| {
                        Error::GenerationFailed(EngineError::Generation(
                            "engine returned no sequences".to_string(),
                        ))
                    })
            })
            .await
            .map_err(worker_failure(Error::GenerationFailed))?
    }

    /// Validates and installs a new configuration for the guild, rebuilding
    /// its engine resource in two reported phases.
    ///
    /// Validation runs before the busy flag is taken, so invalid input never
    /// enters the protected region and never disturbs the live session. A
    /// `ceiling` of `None` disables the cost check.
    ///
    /// # Errors
    ///
    /// - [`Error::SystemNotReady`] / [`Error::GuildNotRegistered`].
    /// - [`Error::InvalidArgument`] / [`Error::UnknownModel`] /
    ///   [`Error::ConfigurationTooExpensive`]; the session is unchanged.
    /// - [`Error::Busy`] while another request holds the generation pathway.
    /// - [`Error::EngineInitFailure`]; the session is left uninitialized.
    pub async fn reconfigure(
        &self,
        guild_id: GuildId,
        config: GenerationConfig,
        ceiling: Option<u64>,
        verbosity: Verbosity,
        replies: &ReplySink,
    ) -> Result<()> {
        self.ensure_ready()?;
        Session::<E>::validate(&self.engine, &config, ceiling)?;
        let session = self.registry.get(guild_id)?;
        let _busy = self.busy.try_acquire().ok_or(Error::Busy)?;

        let verbose = verbosity == Verbosity::Verbose;
        replies.typing().await?;
        match verbosity {
            Verbosity::Verbose => {
                if ceiling.is_none() {
                    replies.text(messages::LIMITS_DISABLED).await?;
                }
                replies.text(messages::VERBOSE_SETTING).await?;
                replies.text(messages::VERBOSE_RELEASING).await?;
            }
            Verbosity::Quiet => {
                replies.text(messages::SETTING_CONFIGURATION).await?;
                replies
                    .text(messages::settings_block("Using settings", &config))
                    .await?;
            }
            Verbosity::Baseline => {}
        }

        let cost = config.cost();
        let applied = config.clone();
        self.with_session(&session, move |s, engine| {
            s.apply_configuration(engine, applied, ceiling)
        })
        .await?;

        if verbose {
            replies.text(messages::VERBOSE_PREINIT).await?;
        }
        self.with_session(&session, |s, engine| s.prepare(engine))
            .await?;

        if verbose {
            replies.text(messages::VERBOSE_BUILDING).await?;
        }
        self.with_session(&session, |s, engine| s.activate(engine))
            .await?;

        #[cfg(feature = "tracing")]
        tracing::info!(guild = guild_id, config = ?config, "Session reconfigured");

        match verbosity {
            Verbosity::Verbose => replies.text(messages::VERBOSE_SET).await?,
            Verbosity::Quiet => replies.text(messages::CONFIGURATION_SET).await?,
            Verbosity::Baseline => return replies.text(messages::DEFAULT_SET).await,
        }

        let threshold = self.options.warn_threshold;
        if cost.is_none_or(|cost| cost > threshold) {
            let warning = if verbose {
                messages::verbose_cost_warning(&config, cost.unwrap_or(u64::MAX), threshold)
            } else {
                messages::PROCESS_INTENSIVE.to_string()
            };
            replies.text(warning).await?;
        }
        Ok(())
    }

    /// Runs a lifecycle step on the worker with the session write-locked.
    async fn with_session<F, R>(&self, session: &SharedSession<E>, step: F) -> Result<R>
    where
        F: FnOnce(&mut Session<E>, &E) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let session = Arc::clone(session);
        let engine = Arc::clone(&self.engine);
        self.worker
            .run(move || {
                let mut session = session.write();
                step(&mut *session, &*engine)
            })
            .await
            .map_err(worker_failure(Error::EngineInitFailure))?
    }

    async fn release_on_worker(&self, sessions: Vec<SharedSession<E>>) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        self.worker
            .run(move || {
                for session in sessions {
                    session.write().release(&engine);
                }
            })
            .await
    }

    /// Stops accepting requests, releases every session and stops the
    /// worker.
    pub async fn shutdown(&self) -> Result<()> {
        self.ready.store(false, Ordering::Release);
        let sessions = self.registry.drain();

        #[cfg(feature = "tracing")]
        tracing::info!(sessions = sessions.len(), "Coordinator shutting down");

        if !sessions.is_empty() {
            self.release_on_worker(sessions).await?;
        }
        self.worker.shutdown().await
    }
}

impl<E: Engine> core::fmt::Debug for Coordinator<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Coordinator")
            .field("ready", &self.is_ready())
            .field("busy", &self.is_busy())
            .field("guilds", &self.registry.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Reports a lost or panicked worker job as an engine failure of the given
/// kind. Other errors pass through.
fn worker_failure(wrap: fn(EngineError) -> Error) -> impl FnOnce(Error) -> Error {
    move |e| match e {
        Error::ChannelError { context } => wrap(EngineError::Worker(context)),
        other => other,
    }
}
