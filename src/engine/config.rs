//! Engine configuration options.

use crate::config::{ConfigError, Environment, ProtocolParams};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Events kept in the in-memory audit log. Older ones are dropped first.
    pub max_events: usize,
    /// Echo committed events and rejected operations to stdout.
    pub verbose: bool,
    pub params: ProtocolParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
            params: ProtocolParams::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_params(params: ProtocolParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Preset parameters for `env`, checked before use.
    pub fn for_environment(env: Environment) -> Result<Self, ConfigError> {
        let params = env.params();
        params.validate()?;
        Ok(Self::with_params(params))
    }
}
