//! Error types for the reconciliation engine.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable class of a remote failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteErrorCode {
    /// The addressed resource does not exist.
    NotFound,
    /// An equivalent resource already exists.
    Conflict,
    /// The caller exceeded the allowed request rate.
    Throttled,
    /// The request was rejected as invalid.
    Validation,
    Other,
}

impl fmt::Display for RemoteErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteErrorCode::NotFound => "not_found",
            RemoteErrorCode::Conflict => "conflict",
            RemoteErrorCode::Throttled => "throttled",
            RemoteErrorCode::Validation => "validation",
            RemoteErrorCode::Other => "other",
        };
        f.write_str(name)
    }
}

/// Error returned by a remote collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: RemoteErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorCode::Conflict, message)
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorCode::Throttled, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorCode::Validation, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorCode::Other, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == RemoteErrorCode::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.code == RemoteErrorCode::Conflict
    }

    pub fn is_throttled(&self) -> bool {
        self.code == RemoteErrorCode::Throttled
    }
}

/// Stable error kind handed to the host framework.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ReadinessTimeout,
    ReadinessCheckFailed,
    DerivationTooLong,
    PermissionGrantFailed,
    RetryBudgetExhausted,
    SubscriptionStoreFailed,
    RequiresReplacement,
    InvalidInput,
    Interrupted,
    Config,
}

/// Main error type for reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Dependency {resource} not ready after {waited:?} (last state: {last_observed_state:?})")]
    ReadinessTimeout {
        resource: String,
        last_observed_state: Option<String>,
        waited: Duration,
    },

    #[error("Status check for {resource} failed: {source}")]
    ReadinessCheckFailed {
        resource: String,
        #[source]
        source: RemoteError,
    },

    #[error("Dependency {resource} entered unexpected state {state}")]
    UnexpectedReadinessState { resource: String, state: String },

    #[error("Statement id for log group {log_group} and {destination} is {length} chars (max {max})")]
    DerivationTooLong {
        log_group: String,
        destination: String,
        length: usize,
        max: usize,
    },

    #[error("Granting {statement_id} on function {function} failed: {source}")]
    PermissionGrantFailed {
        function: String,
        statement_id: String,
        #[source]
        source: RemoteError,
    },

    #[error("Policy document of function {function} is malformed: {reason}")]
    MalformedPolicy { function: String, reason: String },

    #[error("Subscription {filter} on {log_group} not created after {attempts} attempts: {last_error}")]
    RetryBudgetExhausted {
        filter: String,
        log_group: String,
        attempts: u32,
        last_error: RemoteError,
    },

    #[error("Subscription store call for {filter} on {log_group} failed after {attempts} attempt(s): {source}")]
    SubscriptionStoreFailed {
        filter: String,
        log_group: String,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("Field {field} cannot change in place; the subscription must be replaced")]
    RequiresReplacement { field: &'static str },

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Invalid statement id: {0}")]
    InvalidStatementId(String),

    #[error("Cancelled while {stage}")]
    Cancelled { stage: &'static str },

    #[error("Deadline exceeded while {stage}")]
    DeadlineExceeded { stage: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ReconcileError {
    fn from(e: serde_json::Error) -> Self {
        ReconcileError::Serialization(e.to_string())
    }
}

impl ReconcileError {
    /// Stable classification for the host.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            ReconcileError::ReadinessCheckFailed { .. }
            | ReconcileError::UnexpectedReadinessState { .. } => ErrorKind::ReadinessCheckFailed,
            ReconcileError::DerivationTooLong { .. } => ErrorKind::DerivationTooLong,
            ReconcileError::PermissionGrantFailed { .. }
            | ReconcileError::MalformedPolicy { .. } => ErrorKind::PermissionGrantFailed,
            ReconcileError::RetryBudgetExhausted { .. } => ErrorKind::RetryBudgetExhausted,
            ReconcileError::SubscriptionStoreFailed { .. } => ErrorKind::SubscriptionStoreFailed,
            ReconcileError::RequiresReplacement { .. } => ErrorKind::RequiresReplacement,
            ReconcileError::InvalidDestination(_) | ReconcileError::InvalidStatementId(_) => {
                ErrorKind::InvalidInput
            }
            ReconcileError::Cancelled { .. } | ReconcileError::DeadlineExceeded { .. } => {
                ErrorKind::Interrupted
            }
            ReconcileError::InvalidConfig(_)
            | ReconcileError::Io(_)
            | ReconcileError::Serialization(_) => ErrorKind::Config,
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::throttled("Rate exceeded");
        assert_eq!(err.to_string(), "throttled: Rate exceeded");
        assert!(err.is_throttled());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_kind_groups_readiness_failures() {
        let unexpected = ReconcileError::UnexpectedReadinessState {
            resource: "events".into(),
            state: "DELETING".into(),
        };
        let failed = ReconcileError::ReadinessCheckFailed {
            resource: "events".into(),
            source: RemoteError::other("boom"),
        };
        assert_eq!(unexpected.kind(), ErrorKind::ReadinessCheckFailed);
        assert_eq!(failed.kind(), ErrorKind::ReadinessCheckFailed);
    }

    #[test]
    fn test_serde_json_error_converts() {
        let err: ReconcileError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
