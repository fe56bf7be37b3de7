use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::matcher::MatchParams;
use crate::store::DEFAULT_MAX_SAMPLES;

/// Controls resolver behavior.
///
/// Every field has a default, so a partial YAML/JSON document deserializes
/// into a usable config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Descriptor dimension. Default: 128.
    pub dim: usize,

    /// Maximum Euclidean distance (exclusive) to accept a match.
    /// Default: 0.30.
    pub threshold: f32,

    /// Samples retained per identity. Default: 5.
    pub max_samples: usize,

    /// Prepended to generated ids ("person" -> "person_1").
    pub id_prefix: String,

    /// Suffix of the first identity ever created. Default: 1.
    pub first_id: u64,

    /// Longest wait for the resolver lock, in milliseconds. Default: 30s.
    pub lock_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dim: 128,
            threshold: 0.30,
            max_samples: DEFAULT_MAX_SAMPLES,
            id_prefix: "person".into(),
            first_id: 1,
            lock_timeout_ms: 30_000,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dim == 0 {
            return Err(ValidationError::InvalidConfig("dim must be positive".into()));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ValidationError::InvalidConfig(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        if self.max_samples == 0 {
            return Err(ValidationError::InvalidConfig(
                "max_samples must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub(crate) fn match_params(&self) -> MatchParams {
        MatchParams {
            threshold: self.threshold,
            id_prefix: self.id_prefix.clone(),
            first_id: self.first_id,
        }
    }
}
