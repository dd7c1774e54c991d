//! Polls a dependency until it reaches a target state.

use crate::cancel::CancelToken;
use crate::error::{ReconcileError, Result};
use crate::remote::StatusSource;
use crate::types::DependencyReadiness;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const STAGE: &str = "waiting for dependency readiness";

/// Blocks until an upstream resource is ready.
#[derive(Clone)]
pub struct ReadinessWaiter {
    source: Arc<dyn StatusSource>,
}

impl ReadinessWaiter {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self { source }
    }

    /// Poll until the state is one of `target_states`.
    ///
    /// Returns the final state. A state outside both sets stops immediately,
    /// as does a failing status fetch; neither is retried here.
    pub fn wait_until_ready(
        &self,
        readiness: &DependencyReadiness,
        cancel: &CancelToken,
    ) -> Result<String> {
        let resource = readiness.resource_name.as_str();
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            cancel.check().map_err(|i| i.into_error(STAGE))?;

            let state = self.source.get_status(resource).map_err(|source| {
                ReconcileError::ReadinessCheckFailed {
                    resource: resource.to_string(),
                    source,
                }
            })?;
            polls += 1;
            debug!(resource, state = %state, poll = polls, "dependency status");

            if readiness.target_states.contains(&state) {
                return Ok(state);
            }
            if !readiness.pending_states.contains(&state) {
                return Err(ReconcileError::UnexpectedReadinessState {
                    resource: resource.to_string(),
                    state,
                });
            }

            let waited = started.elapsed();
            if waited >= readiness.timeout {
                return Err(ReconcileError::ReadinessTimeout {
                    resource: resource.to_string(),
                    last_observed_state: Some(state),
                    waited,
                });
            }

            let remaining = readiness.timeout - waited;
            cancel.sleep_or_fail(readiness.poll_interval.min(remaining), STAGE)?;
        }
    }
}
