//! Statement identifiers for invocation permissions.
//!
//! Statement ids only allow `[A-Za-z0-9_-]`, while log group names may also
//! contain `/`, `.` and `#`. Those are escaped with `z` as the escape
//! character. `z` itself is escaped first, so every `z` in the output starts
//! exactly one escape sequence and decoding is unambiguous.

use crate::error::{ReconcileError, Result};

/// Longest statement id the destination accepts.
pub const MAX_STATEMENT_ID_LEN: usize = 100;

const ESCAPE: char = 'z';

/// Escaped characters and their sequence suffix, in escaping order.
const ESCAPES: [(char, char); 4] = [(ESCAPE, '0'), ('/', '1'), ('.', '2'), ('#', '3')];

/// Build the statement id for a (log group, destination) pair.
pub fn derive_statement_id(log_group_name: &str, destination_identifier: &str) -> Result<String> {
    let raw = format!("{destination_identifier}-{log_group_name}");
    let escaped = escape(&raw);

    let length = escaped.chars().count();
    if length > MAX_STATEMENT_ID_LEN {
        return Err(ReconcileError::DerivationTooLong {
            log_group: log_group_name.to_string(),
            destination: destination_identifier.to_string(),
            length,
            max: MAX_STATEMENT_ID_LEN,
        });
    }
    Ok(escaped)
}

/// Undo the escaping applied by `derive_statement_id`.
pub fn decode_statement_id(statement_id: &str) -> Result<String> {
    let mut out = String::with_capacity(statement_id.len());
    let mut chars = statement_id.chars();

    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        let code = chars.next().ok_or_else(|| {
            ReconcileError::InvalidStatementId(format!("dangling escape in {statement_id}"))
        })?;
        let original = ESCAPES
            .iter()
            .find(|(_, suffix)| *suffix == code)
            .map(|(original, _)| *original)
            .ok_or_else(|| {
                ReconcileError::InvalidStatementId(format!(
                    "unknown escape z{code} in {statement_id}"
                ))
            })?;
        out.push(original);
    }
    Ok(out)
}

fn escape(raw: &str) -> String {
    let mut escaped = raw.to_string();
    for (original, suffix) in ESCAPES {
        let sequence: String = [ESCAPE, suffix].iter().collect();
        escaped = escaped.replace(original, &sequence);
    }
    escaped
}
