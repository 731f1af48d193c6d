//! Dedicated execution context for engine work.
//!
//! Model inference and resource construction are CPU-heavy and synchronous,
//! so they never run on the async runtime. A single OS thread drains a
//! bounded queue of [`WorkRequest`]s; callers await the result over a
//! oneshot channel while the runtime keeps serving other events.

use crate::{Error, Result};
use core::time::Duration;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) enum WorkRequest {
    /// Run a job; the job reports its own result.
    Run { job: Job },
    /// Stop the worker and acknowledge.
    Shutdown { response: oneshot::Sender<()> },
}

/// Handle to the generation worker thread.
pub(crate) struct GenerationWorker {
    tx: mpsc::Sender<WorkRequest>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl GenerationWorker {
    /// Spawns the worker thread with a queue of `queue` pending jobs.
    pub(crate) fn spawn(queue: usize, shutdown_timeout: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel(queue.max(1));
        std::thread::Builder::new()
            .name("guildtalk-generation".to_string())
            .spawn(move || worker_loop(rx))
            .map_err(|e| Error::ChannelError {
                context: format!("Failed to spawn generation worker: {e}"),
            })?;

        Ok(Self {
            tx,
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        })
    }

    /// Runs `job` on the worker thread and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] once [`GenerationWorker::shutdown`] began.
    /// - [`Error::ChannelError`] if the worker is gone or the job panicked.
    pub(crate) async fn run<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // The caller may have gone away; the result is simply dropped.
            let _ = result_tx.send(job());
        });

        self.tx
            .send(WorkRequest::Run { job })
            .await
            .map_err(|_| Error::ChannelError {
                context: "Generation worker channel closed".to_string(),
            })?;

        result_rx.await.map_err(|_| Error::ChannelError {
            context: "Generation worker dropped the job".to_string(),
        })
    }

    /// Refuses new jobs, lets queued ones finish and stops the thread.
    pub(crate) async fn shutdown(&self) -> Result<()> {
        self.shutdown_token.cancel();

        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(WorkRequest::Shutdown { response: tx })
            .await
            .is_err()
        {
            // Already stopped.
            return Ok(());
        }

        match timeout(self.shutdown_timeout, rx).await {
            Ok(Ok(())) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Generation worker shutdown acknowledged");
                Ok(())
            }
            Ok(Err(_)) => Err(Error::ChannelError {
                context: "Generation worker exited without acknowledging shutdown".to_string(),
            }),
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Generation worker shutdown timed out after {:?}",
                    self.shutdown_timeout
                );
                Ok(())
            }
        }
    }
}

/// Body of the worker thread. Runs until shut down or until every sender is
/// dropped.
fn worker_loop(mut rx: mpsc::Receiver<WorkRequest>) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Generation worker started");

    while let Some(work) = rx.blocking_recv() {
        match work {
            WorkRequest::Run { job } => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Generation job panicked");
                }
            }
            WorkRequest::Shutdown { response } => {
                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Generation worker failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Generation worker stopped");
}
