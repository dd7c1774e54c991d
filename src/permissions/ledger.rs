//! Presence checks and idempotent changes to function invocation policies.

use crate::error::{ReconcileError, Result};
use crate::remote::PolicySource;
use crate::types::{PermissionGrant, PolicyDocument};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a grant request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The permission was added by this call.
    Granted,
    /// An equivalent statement was already there.
    AlreadyPresent,
}

/// Result of a best-effort revoke.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevokeOutcome {
    Removed,
    /// No statement with that id existed.
    Absent,
    /// Removal failed; the permission may be orphaned.
    Failed(String),
}

/// View over a destination's authorization store.
///
/// Only ever touches the statement it is asked about; other statements in
/// the same policy belong to someone else.
#[derive(Clone)]
pub struct PermissionLedger {
    source: Arc<dyn PolicySource>,
}

impl PermissionLedger {
    pub fn new(source: Arc<dyn PolicySource>) -> Self {
        Self { source }
    }

    /// Whether `statement_id` is present in the function's policy.
    ///
    /// A failed fetch counts as absent: a function without any policy is a
    /// normal starting point.
    pub fn exists(&self, function: &str, statement_id: &str) -> Result<bool> {
        let raw = match self.source.get_policy(function) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(function, error = %e, "no readable policy, treating statement as absent");
                return Ok(false);
            }
        };

        let document =
            PolicyDocument::from_json(&raw).map_err(|e| ReconcileError::MalformedPolicy {
                function: function.to_string(),
                reason: e.to_string(),
            })?;

        let found = document.contains(statement_id);
        if !found {
            debug!(function, statement_id, "statement not found in policy");
        }
        Ok(found)
    }

    /// Add the permission. A conflict means another run got there first.
    pub fn grant(&self, grant: &PermissionGrant) -> Result<GrantOutcome> {
        match self.source.add_permission(grant) {
            Ok(()) => {
                info!(
                    function = %grant.function_identifier,
                    statement_id = %grant.statement_id,
                    principal = %grant.principal,
                    "granted invoke permission"
                );
                Ok(GrantOutcome::Granted)
            }
            Err(e) if e.is_conflict() => {
                debug!(
                    function = %grant.function_identifier,
                    statement_id = %grant.statement_id,
                    "permission added concurrently"
                );
                Ok(GrantOutcome::AlreadyPresent)
            }
            Err(source) => Err(ReconcileError::PermissionGrantFailed {
                function: grant.function_identifier.clone(),
                statement_id: grant.statement_id.clone(),
                source,
            }),
        }
    }

    /// Grant only if the statement is not already present.
    pub fn ensure(&self, grant: &PermissionGrant) -> Result<GrantOutcome> {
        if self.exists(&grant.function_identifier, &grant.statement_id)? {
            debug!(
                function = %grant.function_identifier,
                statement_id = %grant.statement_id,
                "permission already present"
            );
            return Ok(GrantOutcome::AlreadyPresent);
        }
        self.grant(grant)
    }

    /// Remove the statement if present. Never fails the caller.
    pub fn revoke(&self, function: &str, statement_id: &str) -> RevokeOutcome {
        match self.exists(function, statement_id) {
            Ok(false) => return RevokeOutcome::Absent,
            Ok(true) => {}
            Err(e) => {
                warn!(function, statement_id, error = %e, "cannot inspect policy, skipping revoke");
                return RevokeOutcome::Failed(e.to_string());
            }
        }

        match self.source.remove_permission(function, statement_id) {
            Ok(()) => {
                info!(function, statement_id, "revoked invoke permission");
                RevokeOutcome::Removed
            }
            Err(e) if e.is_not_found() => RevokeOutcome::Absent,
            Err(e) => {
                warn!(function, statement_id, error = %e, "failed to revoke invoke permission");
                RevokeOutcome::Failed(e.to_string())
            }
        }
    }
}
