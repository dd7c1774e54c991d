//! Reconciliation of log subscriptions.
//!
//! Create runs walk the phases in order:
//!
//! ```text
//! Init -> WaitingDependency (stream) -> Authorizing (function) -> Creating -> Ready
//!                      \________________________\_________________\-> Failed
//! ```
//!
//! Updates enter at `Creating`. Teardown is a separate sequence: revoke the
//! permission (best effort), delete the subscription (not-found is success),
//! then clear the identity.
//!
//! # Example
//!
//! ```ignore
//! let reconciler = SubscriptionReconciler::new(config, streams, functions, logs)?;
//! let spec = SubscriptionSpec::new(
//!     "ship-errors",
//!     "/app/orders",
//!     "arn:aws:lambda:us-east-1:123456789012:function:shipper",
//!     "ERROR",
//! )?;
//!
//! let cancel = CancelToken::with_timeout(Duration::from_secs(600));
//! let mut identity = Some(reconciler.reconcile(&spec, &cancel)?);
//! reconciler.teardown(&mut identity, &spec, &cancel)?;
//! ```

mod phase;
mod subscription;

pub use phase::ReconcilePhase;
pub use subscription::SubscriptionReconciler;
