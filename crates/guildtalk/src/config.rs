//! Per-guild generation configuration.

use crate::{Error, Result};

/// Opaque identifier of a guild, assigned by the chat transport.
pub type GuildId = u64;

/// Model used by the baseline configuration.
pub const BASELINE_MODEL: &str = "117M";

/// The five knobs a guild can tune. They are always stored and applied
/// together; see [`crate::Session::apply_configuration`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Number of generations produced per request.
    pub nsamples: u32,
    /// Target token count per generation.
    pub length: u32,
    /// Sampling randomness; lower is more deterministic.
    pub temperature: f32,
    /// Number of candidate tokens considered per step, `0` for unrestricted.
    pub top_k: u32,
    /// Name of an installed model.
    pub model_name: String,
}

impl GenerationConfig {
    /// The configuration restored by the `default` command.
    pub fn baseline(model_name: impl Into<String>) -> Self {
        Self {
            nsamples: 1,
            length: 200,
            temperature: 1.0,
            top_k: 0,
            model_name: model_name.into(),
        }
    }

    /// Cost of a request under this configuration, `nsamples * length`.
    ///
    /// Returns `None` on overflow, which callers treat as unaffordable.
    pub const fn cost(&self) -> Option<u64> {
        (self.nsamples as u64).checked_mul(self.length as u64)
    }

    /// Checks the numeric ranges independent of any deployment.
    pub fn validate_ranges(&self) -> Result<()> {
        if self.nsamples == 0 {
            return Err(Error::InvalidArgument {
                reason: "nsamples must be greater than 0".to_string(),
            });
        }
        if self.length == 0 {
            return Err(Error::InvalidArgument {
                reason: "length must be greater than 0".to_string(),
            });
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(Error::InvalidArgument {
                reason: format!("temperature must be positive, got {}", self.temperature),
            });
        }
        Ok(())
    }

    /// Checks `nsamples * length` against `ceiling`. `None` disables the check.
    pub fn check_cost(&self, ceiling: Option<u64>) -> Result<()> {
        let Some(ceiling) = ceiling else {
            return Ok(());
        };
        match self.cost() {
            Some(cost) if cost <= ceiling => Ok(()),
            Some(cost) => Err(Error::ConfigurationTooExpensive { cost, ceiling }),
            None => Err(Error::ConfigurationTooExpensive {
                cost: u64::MAX,
                ceiling,
            }),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::baseline(BASELINE_MODEL)
    }
}
