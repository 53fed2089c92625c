//! # Validation
//!
//! Validates service and key segments before they reach a backend.
//!
//! Both segments are joined with `/` to form backend-native names, so a
//! segment may only contain path-safe characters and never the separator.

use crate::error::StoreError;
use crate::model::SecretId;
use regex::Regex;
use std::sync::LazyLock;

/// Alphanumerics plus `-`, `_`, `.`; must start and end with an alphanumeric
static PATH_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$")
        .expect("Failed to compile path segment regex - this should never happen")
});

/// Check a single service or key segment
pub fn validate_name(name: &str) -> bool {
    PATH_SEGMENT.is_match(name)
}

/// Validate both segments of a secret id
///
/// # Errors
///
/// Returns [`StoreError::Validation`] naming the first offending segment.
pub fn validate_id(id: &SecretId) -> Result<(), StoreError> {
    if !validate_name(&id.service) {
        return Err(StoreError::Validation(format!(
            "service '{}' must be non-empty, contain only alphanumeric characters, hyphens, underscores and dots, and start and end with an alphanumeric character",
            id.service
        )));
    }
    if !validate_name(&id.key) {
        return Err(StoreError::Validation(format!(
            "key '{}' must be non-empty, contain only alphanumeric characters, hyphens, underscores and dots, and start and end with an alphanumeric character",
            id.key
        )));
    }
    Ok(())
}
