//! Subscription reconciler: drives a subscription from desired to observed.

use crate::cancel::CancelToken;
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, RemoteError, Result};
use crate::locks::{IdentityGuard, IdentityLocks};
use crate::permissions::{derive_statement_id, PermissionLedger, RevokeOutcome};
use crate::readiness::ReadinessWaiter;
use crate::remote::{PolicySource, StatusSource, SubscriptionStore};
use crate::retry::{RetryError, RetryExecutor};
use crate::types::{PermissionGrant, SubscriptionId, SubscriptionSpec};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

use super::phase::ReconcilePhase;

/// Orchestrates readiness, authorization and the subscription itself.
///
/// Holds no remote state between calls; every run observes the remote
/// services afresh, so it is safe across restarts and concurrent runs.
pub struct SubscriptionReconciler {
    config: ReconcilerConfig,
    waiter: ReadinessWaiter,
    ledger: PermissionLedger,
    store: Arc<dyn SubscriptionStore>,
    retry: RetryExecutor,
    locks: IdentityLocks,
}

impl SubscriptionReconciler {
    /// Build a reconciler; fails if `config` does not validate.
    pub fn new(
        config: ReconcilerConfig,
        status: Arc<dyn StatusSource>,
        policies: Arc<dyn PolicySource>,
        store: Arc<dyn SubscriptionStore>,
    ) -> Result<Self> {
        config.validate()?;
        let retry = RetryExecutor::new(config.retry.clone());
        Ok(Self {
            config,
            waiter: ReadinessWaiter::new(status),
            ledger: PermissionLedger::new(policies),
            store,
            retry,
            locks: IdentityLocks::new(),
        })
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &PermissionLedger {
        &self.ledger
    }

    // --- Create / Update ---

    /// Create the subscription, running every phase from `Init`.
    ///
    /// Returns the deterministic identity once the store accepted the filter.
    pub fn reconcile(&self, spec: &SubscriptionSpec, cancel: &CancelToken) -> Result<SubscriptionId> {
        let identity = spec.identity();
        let _span = info_span!(
            "reconcile",
            subscription = %identity,
            log_group = %spec.log_group_name,
            filter = %spec.name,
        )
        .entered();
        let _guard = self.serialize(&identity, cancel)?;

        self.drive(spec, ReconcilePhase::Init, cancel)?;
        Ok(identity)
    }

    /// Apply in-place changes to an existing subscription.
    ///
    /// Starts at `Creating`: readiness and the grant were settled on create,
    /// and the statement id cannot change while the log group and
    /// destination stay fixed.
    pub fn update(
        &self,
        prior: &SubscriptionSpec,
        desired: &SubscriptionSpec,
        cancel: &CancelToken,
    ) -> Result<SubscriptionId> {
        if let Some(field) = desired.replacement_field(prior) {
            return Err(ReconcileError::RequiresReplacement { field });
        }

        let identity = desired.identity();
        let _span = info_span!(
            "update",
            subscription = %identity,
            log_group = %desired.log_group_name,
            filter = %desired.name,
        )
        .entered();
        let _guard = self.serialize(&identity, cancel)?;

        self.drive(desired, ReconcilePhase::Creating, cancel)?;
        Ok(identity)
    }

    fn drive(
        &self,
        spec: &SubscriptionSpec,
        entry: ReconcilePhase,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut phase = entry;

        while !phase.is_terminal() {
            let next = cancel
                .check()
                .map_err(|i| i.into_error(phase.as_str()))
                .and_then(|()| self.advance(phase, spec, cancel));

            match next {
                Ok(next) => {
                    debug!(from = %phase, to = %next, "phase transition");
                    phase = next;
                }
                Err(e) => {
                    warn!(
                        from = %phase,
                        to = %ReconcilePhase::Failed,
                        error = %e,
                        "reconciliation failed"
                    );
                    return Err(e);
                }
            }
        }

        info!("subscription ready");
        Ok(())
    }

    fn advance(
        &self,
        phase: ReconcilePhase,
        spec: &SubscriptionSpec,
        cancel: &CancelToken,
    ) -> Result<ReconcilePhase> {
        let kind = spec.destination.kind;
        match phase {
            ReconcilePhase::Init => Ok(ReconcilePhase::first_for(kind)),
            ReconcilePhase::WaitingDependency => {
                self.wait_for_destination(spec, cancel)?;
                Ok(ReconcilePhase::after_readiness(kind))
            }
            ReconcilePhase::Authorizing => {
                self.authorize(spec)?;
                Ok(ReconcilePhase::Creating)
            }
            ReconcilePhase::Creating => {
                self.put_subscription(spec, cancel)?;
                Ok(ReconcilePhase::Ready)
            }
            terminal => Ok(terminal),
        }
    }

    fn wait_for_destination(&self, spec: &SubscriptionSpec, cancel: &CancelToken) -> Result<()> {
        let readiness = self
            .config
            .stream_readiness
            .for_stream(&spec.destination.identifier);
        let state = self.waiter.wait_until_ready(&readiness, cancel)?;
        info!(stream = %spec.destination.identifier, state = %state, "destination ready");
        Ok(())
    }

    fn authorize(&self, spec: &SubscriptionSpec) -> Result<()> {
        let statement_id =
            derive_statement_id(&spec.log_group_name, &spec.destination.identifier)?;
        let grant = PermissionGrant::for_subscription(spec, statement_id);
        let outcome = self.ledger.ensure(&grant)?;
        debug!(statement_id = %grant.statement_id, outcome = ?outcome, "authorization settled");
        Ok(())
    }

    fn put_subscription(&self, spec: &SubscriptionSpec, cancel: &CancelToken) -> Result<()> {
        let request = spec.put_request();
        self.retry
            .execute(
                || self.store.put(&request),
                RemoteError::is_throttled,
                cancel,
            )
            .map_err(|e| store_error(spec, e, "backing off a throttled put"))
    }

    // --- Teardown ---

    /// Remove the permission (best effort) and then the subscription.
    ///
    /// `identity` is cleared only once the store confirms the filter is gone.
    pub fn teardown(
        &self,
        identity: &mut Option<SubscriptionId>,
        spec: &SubscriptionSpec,
        cancel: &CancelToken,
    ) -> Result<()> {
        let expected = spec.identity();
        let _span = info_span!(
            "teardown",
            subscription = %expected,
            log_group = %spec.log_group_name,
            filter = %spec.name,
        )
        .entered();
        if let Some(current) = identity.as_ref() {
            if *current != expected {
                warn!(current = %current, "identity does not match log group");
            }
        }
        let _guard = self.serialize(&expected, cancel)?;

        if spec.destination.requires_authorization() {
            self.revoke_permission(spec);
        }

        cancel
            .check()
            .map_err(|i| i.into_error("deleting subscription"))?;
        let deleted = self.retry.execute(
            || match self.store.delete(&spec.log_group_name, &spec.name) {
                Err(e) if e.is_not_found() => {
                    debug!("subscription already gone");
                    Ok(())
                }
                other => other,
            },
            RemoteError::is_throttled,
            cancel,
        );
        if let Err(e) = deleted {
            let e = store_error(spec, e, "backing off a throttled delete");
            warn!(error = %e, "teardown failed");
            return Err(e);
        }

        *identity = None;
        info!("subscription removed");
        Ok(())
    }

    fn revoke_permission(&self, spec: &SubscriptionSpec) {
        let function = spec.destination.function_ref();
        match derive_statement_id(&spec.log_group_name, &spec.destination.identifier) {
            Ok(statement_id) => {
                if let RevokeOutcome::Failed(reason) = self.ledger.revoke(&function, &statement_id)
                {
                    warn!(function = %function, reason = %reason, "leaving permission in place");
                }
            }
            // No grant can exist under an id that could never be derived.
            Err(e) => warn!(error = %e, "skipping permission revoke"),
        }
    }

    // --- Observe ---

    /// Look the subscription up in the store.
    ///
    /// `None` means it is gone remotely and the host should forget it.
    pub fn observe(&self, spec: &SubscriptionSpec) -> Result<Option<SubscriptionId>> {
        let filters = self
            .store
            .describe(&spec.log_group_name, &spec.name)
            .map_err(|source| ReconcileError::SubscriptionStoreFailed {
                filter: spec.name.clone(),
                log_group: spec.log_group_name.clone(),
                attempts: 1,
                source,
            })?;

        let found = filters
            .iter()
            .any(|f| f.log_group_name == spec.log_group_name);
        if !found {
            debug!(log_group = %spec.log_group_name, filter = %spec.name, "subscription not found");
        }
        Ok(found.then(|| spec.identity()))
    }

    fn serialize(
        &self,
        identity: &SubscriptionId,
        cancel: &CancelToken,
    ) -> Result<Option<IdentityGuard<'_>>> {
        if !self.config.serialize_per_identity {
            return Ok(None);
        }
        self.locks
            .lock(identity.as_str(), cancel)
            .map(Some)
            .map_err(|i| i.into_error("acquiring identity lock"))
    }
}

fn store_error(
    spec: &SubscriptionSpec,
    error: RetryError<RemoteError>,
    stage: &'static str,
) -> ReconcileError {
    match error {
        RetryError::Failed { attempts, error } => ReconcileError::SubscriptionStoreFailed {
            filter: spec.name.clone(),
            log_group: spec.log_group_name.clone(),
            attempts,
            source: error,
        },
        RetryError::Exhausted {
            attempts,
            last_error,
        } => ReconcileError::RetryBudgetExhausted {
            filter: spec.name.clone(),
            log_group: spec.log_group_name.clone(),
            attempts,
            last_error,
        },
        RetryError::Interrupted { interrupt, .. } => interrupt.into_error(stage),
    }
}
