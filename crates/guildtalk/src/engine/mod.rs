//! The seam between sessions and the text-generation engine.
//!
//! Sessions never touch model internals. They drive an [`Engine`] through a
//! two-phase build ([`Engine::build_pre`] then [`Engine::build_session`]),
//! invoke [`Engine::generate`] on the resulting handle and hand the handle
//! back through [`Engine::dispose`] when the guild reconfigures or leaves.
//!
//! ## Implementations
//!
//! - [`BigramEngine`] - a self-contained character-bigram sampler that reads
//!   models from a directory of corpora.

mod bigram;
mod catalog;
#[cfg(test)]
pub(crate) mod mock;

pub use bigram::{BigramEngine, BigramHandle, BigramParams, HPARAMS_FILE, StagedModel};
pub use catalog::ModelCatalog;

use crate::config::GenerationConfig;
use std::path::PathBuf;

/// A single unit of the engine's vocabulary.
pub type Token = u32;

/// Failures raised by an [`Engine`].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// Reading model files from disk failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model's hyper-parameter file is malformed.
    #[error("invalid hyper-parameters in {}: {source}", path.display())]
    Hparams {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The requested length does not fit in the model's context window.
    #[error("cannot sample {length} tokens, the model window is {window}")]
    WindowExceeded { length: u32, window: u32 },

    /// The model has nothing to sample from.
    #[error("model `{0}` has an empty corpus")]
    EmptyModel(String),

    /// The engine failed while producing tokens.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The generation worker could not run the job.
    #[error("generation worker failed: {0}")]
    Worker(String),
}

/// A text-generation engine shared by every guild.
///
/// Implementations must be cheap to share: one instance serves all sessions,
/// while each session owns its own [`Engine::Handle`].
pub trait Engine: Send + Sync + 'static {
    /// Intermediate result of the lightweight first build phase.
    type Prepared: Send + Sync + 'static;

    /// The expensive, loaded model resource owned by a ready session.
    type Handle: Send + Sync + 'static;

    /// Names of the models that can be configured.
    fn installed_models(&self) -> &ModelCatalog;

    /// Converts text to tokens.
    fn encode(&self, text: &str) -> Vec<Token>;

    /// Converts tokens back to text; inverse of [`Engine::encode`].
    fn decode(&self, tokens: &[Token]) -> String;

    /// First build phase: validate and stage everything `config` needs.
    fn build_pre(&self, config: &GenerationConfig) -> Result<Self::Prepared, EngineError>;

    /// Second build phase: construct the live resource.
    fn build_session(
        &self,
        prepared: Self::Prepared,
        config: &GenerationConfig,
    ) -> Result<Self::Handle, EngineError>;

    /// Produces a batch of token sequences, optionally conditioned on
    /// `prompt`.
    fn generate(
        &self,
        handle: &Self::Handle,
        prompt: Option<&[Token]>,
    ) -> Result<Vec<Vec<Token>>, EngineError>;

    /// Releases the live resource.
    fn dispose(&self, handle: Self::Handle) {
        drop(handle);
    }
}
