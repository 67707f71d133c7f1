//! Input checks for service calls.

use crate::{Error, ErrorContext, Result};

/// Largest page a single `list` call may return.
pub const MAX_LIST_LIMIT: u64 = 10_000;

fn invalid(field: &str, reason: &str) -> Error {
    Error::validation_with_context(
        reason,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("request_service"),
    )
}

pub fn positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(invalid(field, "value must be greater than 0"));
    }
    Ok(())
}

pub fn list_limit(limit: u64) -> Result<()> {
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(invalid(
            "limit",
            &format!("value must be inside range (0, {}]", MAX_LIST_LIMIT),
        ));
    }
    Ok(())
}
