use std::time::Duration;

use serde::Deserialize;

/// Orchestrator settings that apply to every provider
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Retry policy for upstream calls made before any output is produced
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry policy owned by the orchestrator
///
/// The default of a single attempt disables retries entirely.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts (e.g. "250ms", "1s")
    #[serde(
        default = "default_backoff",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    1
}

const fn default_backoff() -> Duration {
    Duration::from_millis(250)
}
