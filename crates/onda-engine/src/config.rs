//! Engine configuration.
//!
//! Tuning parameters that embeddings may override, loadable from TOML:
//!
//! ```toml
//! quantum_size = 128
//! script_timeout_ms = 500
//! initial_silent_blocks = 1
//! max_channels = 32
//! ```
//!
//! The realtime script wait timeout is deliberately a tuning parameter:
//! exceeding it yields silence for that block plus a throttled log entry,
//! with no escalation path - the render thread must never wait unboundedly,
//! even at the cost of an occasional audible dropout under control-thread
//! overload.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors loading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML text failed to parse.
    #[error("invalid engine config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The quantum size must be a nonzero power of two.
    #[error("quantum size {0} must be a nonzero power of two")]
    InvalidQuantumSize(usize),

    /// The realtime script wait timeout must be nonzero.
    #[error("script timeout must be nonzero")]
    InvalidTimeout,

    /// The mixing channel ceiling must be nonzero.
    #[error("channel ceiling must be nonzero")]
    InvalidChannelCeiling,
}

/// Engine tuning parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Frames processed per render-graph traversal.
    pub quantum_size: usize,
    /// Bounded wait for one realtime script-processor block, milliseconds.
    pub script_timeout_ms: u64,
    /// Silent block periods a script processor owes before emitting its
    /// first script-produced output (models invocation latency).
    pub initial_silent_blocks: usize,
    /// Upper bound on mixed channel counts at graph edges.
    pub max_channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quantum_size: 128,
            script_timeout_ms: 500,
            initial_silent_blocks: 1,
            max_channels: 32,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML configuration. Missing fields take their
    /// defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quantum_size == 0 || !self.quantum_size.is_power_of_two() {
            return Err(ConfigError::InvalidQuantumSize(self.quantum_size));
        }
        if self.script_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.max_channels == 0 {
            return Err(ConfigError::InvalidChannelCeiling);
        }
        Ok(())
    }

    /// The realtime script wait timeout as a [`Duration`].
    pub fn script_timeout(&self) -> Duration {
        Duration::from_millis(self.script_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.quantum_size, 128);
        assert_eq!(config.script_timeout_ms, 500);
        assert_eq!(config.initial_silent_blocks, 1);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = EngineConfig::from_toml_str(
            "quantum_size = 256\nscript_timeout_ms = 50\n",
        )
        .unwrap();
        assert_eq!(config.quantum_size, 256);
        assert_eq!(config.script_timeout_ms, 50);
        // Unspecified fields keep their defaults.
        assert_eq!(config.max_channels, 32);
    }

    #[test]
    fn empty_toml_is_the_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn rejects_non_power_of_two_quantum() {
        let err = EngineConfig::from_toml_str("quantum_size = 96").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQuantumSize(96)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = EngineConfig::from_toml_str("script_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(EngineConfig::from_toml_str("bogus = 1").is_err());
    }
}
