//! Contracts of the remote services the reconciler drives.
//!
//! Implementations wrap the real API clients; credential and endpoint
//! setup stay with the host.

use crate::error::RemoteError;
use crate::types::{PermissionGrant, PutSubscriptionRequest, SubscriptionFilter};

/// Reports the lifecycle state of an upstream resource (e.g. a stream).
pub trait StatusSource: Send + Sync {
    fn get_status(&self, resource_name: &str) -> Result<String, RemoteError>;
}

/// Authorization store of destination functions.
pub trait PolicySource: Send + Sync {
    /// Raw JSON policy document attached to the function.
    fn get_policy(&self, function: &str) -> Result<String, RemoteError>;

    fn add_permission(&self, grant: &PermissionGrant) -> Result<(), RemoteError>;

    fn remove_permission(&self, function: &str, statement_id: &str) -> Result<(), RemoteError>;
}

/// Log-service side of the subscription.
pub trait SubscriptionStore: Send + Sync {
    /// Create or replace the filter named in the request.
    fn put(&self, request: &PutSubscriptionRequest) -> Result<(), RemoteError>;

    fn delete(&self, log_group_name: &str, filter_name: &str) -> Result<(), RemoteError>;

    /// Filters on `log_group_name` whose names start with `name_prefix`.
    fn describe(
        &self,
        log_group_name: &str,
        name_prefix: &str,
    ) -> Result<Vec<SubscriptionFilter>, RemoteError>;
}
