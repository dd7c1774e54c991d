//! # Log Subscription Reconciler
//!
//! Drives a log-event subscription (log group to stream or function) from
//! its desired state to the same state observed remotely.
//!
//! ## Core Concepts
//!
//! - **Readiness**: stream destinations are polled until active
//! - **Permissions**: function destinations get an invocation grant, looked
//!   up by a deterministic statement id before it is added
//! - **Retries**: throttled create calls back off with jitter, everything
//!   else fails fast
//! - **Teardown**: permission first (best effort), then the subscription;
//!   not-found counts as done
//!
//! Remote services are reached through the traits in [`remote`]; the host
//! supplies the implementations.

pub mod cancel;
pub mod config;
pub mod error;
pub mod locks;
pub mod permissions;
pub mod readiness;
pub mod reconciler;
pub mod remote;
pub mod retry;
pub mod types;

// Re-exports
pub use cancel::{CancelToken, Interrupt};
pub use config::{ReconcilerConfig, StreamReadinessConfig};
pub use error::{ErrorKind, ReconcileError, RemoteError, RemoteErrorCode, Result};
pub use locks::{IdentityGuard, IdentityLocks};
pub use permissions::{
    decode_statement_id, derive_statement_id, GrantOutcome, PermissionLedger, RevokeOutcome,
    MAX_STATEMENT_ID_LEN,
};
pub use readiness::ReadinessWaiter;
pub use reconciler::{ReconcilePhase, SubscriptionReconciler};
pub use remote::{PolicySource, StatusSource, SubscriptionStore};
pub use retry::{jitter_between, RetryError, RetryExecutor};
pub use types::*;
