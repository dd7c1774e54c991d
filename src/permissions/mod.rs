//! Cross-service invocation permissions.
//!
//! Function destinations need a statement in their policy that lets the
//! log service invoke them. The statement id is derived deterministically
//! from the (log group, function) pair, so any run can check for it before
//! adding it and find it again on teardown.

mod ledger;
mod statement_id;

pub use ledger::{GrantOutcome, PermissionLedger, RevokeOutcome};
pub use statement_id::{decode_statement_id, derive_statement_id, MAX_STATEMENT_ID_LEN};
