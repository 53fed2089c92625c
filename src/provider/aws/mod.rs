//! # AWS Backends
//!
//! Secrets Manager and SSM Parameter Store stores sharing one SDK
//! configuration, caller identity and error classification.

pub mod auth;
pub mod errors;
pub mod parameter_store;
pub mod secrets_manager;

pub use parameter_store::ParameterStore;
pub use secrets_manager::SecretsManagerStore;

use aws_sdk_secretsmanager::primitives::DateTime;
use chrono::Utc;

/// Convert an AWS timestamp; `None` if it is out of chrono's range
pub(crate) fn to_chrono(value: &DateTime) -> Option<chrono::DateTime<Utc>> {
    chrono::DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}
