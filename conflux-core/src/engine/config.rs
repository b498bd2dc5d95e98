//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::SerializationError;

/// Default bound on concurrently running node computations.
pub const DEFAULT_MAX_CONCURRENCY: usize = 64;

/// What happens to in-flight siblings once a node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort in-flight computations.
    #[default]
    Cancel,
    /// Let in-flight computations finish, then report.
    Drain,
}

/// Tuning knobs for an [`super::Executor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of node computations running at once. Zero is
    /// treated as one.
    pub max_concurrency: usize,

    /// Treat a missing adapter key as an error instead of an empty
    /// fragment.
    pub strict_adapters: bool,

    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            strict_adapters: false,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_strict_adapters(mut self, strict: bool) -> Self {
        self.strict_adapters = strict;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Parse a configuration, filling unspecified fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, SerializationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub(crate) fn permits(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{"strict_adapters": true}"#).unwrap();
        assert!(config.strict_adapters);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.failure_policy, FailurePolicy::Cancel);
    }

    #[test]
    fn failure_policy_names() {
        let config = EngineConfig::from_json(r#"{"failure_policy": "drain"}"#).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Drain);
    }

    #[test]
    fn zero_concurrency_still_makes_progress() {
        assert_eq!(EngineConfig::default().with_max_concurrency(0).permits(), 1);
    }
}
