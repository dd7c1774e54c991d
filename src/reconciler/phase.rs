//! Phases of a create-or-update run.

use crate::types::DestinationKind;
use std::fmt;

/// Where a reconciliation run currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReconcilePhase {
    Init,
    /// Waiting for a stream destination to become active.
    WaitingDependency,
    /// Making sure the function destination may be invoked.
    Authorizing,
    /// Submitting the subscription under the retry policy.
    Creating,
    Ready,
    Failed,
}

impl ReconcilePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReconcilePhase::Ready | ReconcilePhase::Failed)
    }

    /// Phase entered after `Init` for a destination kind.
    pub fn first_for(kind: DestinationKind) -> Self {
        match kind {
            DestinationKind::Stream => ReconcilePhase::WaitingDependency,
            DestinationKind::FunctionInvoke => ReconcilePhase::Authorizing,
            DestinationKind::Other => ReconcilePhase::Creating,
        }
    }

    /// Phase entered once the dependency is ready.
    pub fn after_readiness(kind: DestinationKind) -> Self {
        match kind {
            DestinationKind::FunctionInvoke => ReconcilePhase::Authorizing,
            _ => ReconcilePhase::Creating,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReconcilePhase::Init => "init",
            ReconcilePhase::WaitingDependency => "waiting_dependency",
            ReconcilePhase::Authorizing => "authorizing",
            ReconcilePhase::Creating => "creating",
            ReconcilePhase::Ready => "ready",
            ReconcilePhase::Failed => "failed",
        }
    }
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
