//! Reconciler configuration.

use crate::error::{ReconcileError, Result};
use crate::types::{duration_millis, DependencyReadiness, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How long and how often to wait for a stream destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamReadinessConfig {
    pub pending_states: Vec<String>,
    pub target_states: Vec<String>,
    #[serde(with = "duration_millis", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    #[serde(with = "duration_millis", rename = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for StreamReadinessConfig {
    fn default() -> Self {
        Self {
            pending_states: vec!["CREATING".into(), "UPDATING".into(), "DELETING".into()],
            target_states: vec!["ACTIVE".into()],
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl StreamReadinessConfig {
    /// Readiness parameters for one named stream.
    pub fn for_stream(&self, stream_name: &str) -> DependencyReadiness {
        DependencyReadiness::new(
            stream_name,
            self.pending_states.iter().cloned(),
            self.target_states.iter().cloned(),
        )
        .with_poll_interval(self.poll_interval)
        .with_timeout(self.timeout)
    }
}

/// Reconciler configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Retry policy for create/update calls.
    pub retry: RetryPolicy,

    /// Readiness wait for stream destinations.
    pub stream_readiness: StreamReadinessConfig,

    /// Serialize runs for the same identity within this process.
    pub serialize_per_identity: bool,
}

impl ReconcilerConfig {
    /// Parse from JSON text; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ReconcileError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            return Err(ReconcileError::InvalidConfig(format!(
                "retry.jitter_fraction must be within [0, 1], got {}",
                self.retry.jitter_fraction
            )));
        }
        if self.stream_readiness.target_states.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "stream_readiness.target_states must not be empty".into(),
            ));
        }
        if self.stream_readiness.poll_interval.is_zero() {
            return Err(ReconcileError::InvalidConfig(
                "stream_readiness.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
