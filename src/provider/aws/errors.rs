//! # AWS Error Classification
//!
//! Maps AWS SDK errors onto [`StoreError`] so no SDK type leaks to callers.
//! Secrets Manager and SSM share the same smithy error types, so one set of
//! helpers serves both clients.

use crate::error::{BackendError, StoreError};
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

/// Outcome class of a failed AWS call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Transient,
    Permanent,
}

/// Classify an AWS error code
pub fn classify_code(code: Option<&str>) -> ErrorClass {
    match code {
        Some(
            "ResourceNotFoundException" | "ParameterNotFound" | "ParameterVersionNotFound",
        ) => ErrorClass::NotFound,
        Some(
            "ThrottlingException"
            | "Throttling"
            | "TooManyRequestsException"
            | "RequestLimitExceeded"
            | "TooManyUpdates"
            | "InternalServiceError"
            | "InternalServerError"
            | "InternalFailure"
            | "ServiceUnavailable"
            | "RequestTimeout",
        ) => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

/// Classify an SDK error; timeouts and dispatch failures never reached the service
pub fn classify_sdk_error<E, R>(err: &SdkError<E, R>) -> ErrorClass
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ErrorClass::Transient,
        _ => classify_code(err.as_service_error().and_then(ProvideErrorMetadata::code)),
    }
}

/// Convert an SDK error into a [`StoreError`]
///
/// `subject` names what was being accessed and is used in `NotFound` messages.
pub fn map_sdk_error<E, R>(operation: &str, subject: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match classify_sdk_error(&err) {
        ErrorClass::NotFound => StoreError::not_found(subject),
        ErrorClass::Transient => BackendError::transient(operation, message).into(),
        ErrorClass::Permanent => BackendError::permanent(operation, message).into(),
    }
}
