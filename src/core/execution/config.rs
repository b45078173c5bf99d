//! Configuration for deltasim simulation execution
//!
//! Controls convergence bounds, the default multi-writer policy for signals
//! and how diagnostics are mirrored to the log.

use serde::{Deserialize, Serialize};

/// How a signal treats writes from more than one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriterPolicy {
    /// Any process may write; the last staged value in a delta cycle wins
    LastWriteWins,
    /// Only the first process that writes the signal may ever drive it
    SingleWriter,
}

impl Default for WriterPolicy {
    fn default() -> Self {
        WriterPolicy::LastWriteWins
    }
}

/// Configuration for simulation execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Upper bound on delta cycles at one time instant before reporting divergence
    pub max_delta_cycles: u32,
    /// Writer policy for signals created without an explicit one
    pub default_writer_policy: WriterPolicy,
    /// Mirror diagnostics to the `log` facade
    pub log_diagnostics: bool,
    /// Label appended to timestamps in log output
    pub time_unit: String,
}

impl SimulationConfig {
    /// Create a new simulation configuration with default values
    ///
    /// Default configuration allows 10 000 delta cycles per instant,
    /// last-write-wins signals and logged diagnostics.
    pub fn new() -> Self {
        Self {
            max_delta_cycles: 10_000,
            default_writer_policy: WriterPolicy::default(),
            log_diagnostics: true,
            time_unit: "ns".to_string(),
        }
    }

    /// Set the delta-cycle bound per time instant
    pub fn with_max_delta_cycles(mut self, max: u32) -> Self {
        self.max_delta_cycles = max;
        self
    }

    /// Set the writer policy used by `signal()` and `buffer()`
    pub fn with_writer_policy(mut self, policy: WriterPolicy) -> Self {
        self.default_writer_policy = policy;
        self
    }

    /// Enable or disable mirroring diagnostics to the log
    pub fn with_log_diagnostics(mut self, enabled: bool) -> Self {
        self.log_diagnostics = enabled;
        self
    }

    /// Set the time unit label
    pub fn with_time_unit(mut self, unit: &str) -> Self {
        self.time_unit = unit.to_string();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), crate::core::errors::SimError> {
        if self.max_delta_cycles == 0 {
            return Err(crate::core::errors::SimError::Config(
                "max_delta_cycles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.max_delta_cycles, 10_000);
        assert_eq!(config.default_writer_policy, WriterPolicy::LastWriteWins);
        assert!(config.log_diagnostics);
    }

    #[test]
    fn test_config_builder() {
        let config = SimulationConfig::new()
            .with_max_delta_cycles(64)
            .with_writer_policy(WriterPolicy::SingleWriter)
            .with_log_diagnostics(false)
            .with_time_unit("ps");

        assert_eq!(config.max_delta_cycles, 64);
        assert_eq!(config.default_writer_policy, WriterPolicy::SingleWriter);
        assert!(!config.log_diagnostics);
        assert_eq!(config.time_unit, "ps");
    }

    #[test]
    fn test_zero_delta_bound_rejected() {
        let config = SimulationConfig::new().with_max_delta_cycles(0);
        assert!(config.validate().is_err());
    }
}
