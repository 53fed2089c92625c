//! # Observability
//!
//! Prometheus metrics for store operations. Logging is done with `tracing`
//! spans directly in each backend; [`complete`] closes an operation on both.

pub mod metrics;

use crate::error::Result;
use std::time::Instant;
use tracing::Span;

/// Record an operation's outcome on its span and in the metrics
///
/// The span must declare `operation.success`, `operation.duration_ms` and
/// `error.kind` (as `tracing::field::Empty`) for the fields to be kept.
pub(crate) fn complete<T>(
    span: &Span,
    backend: &str,
    operation: &str,
    start: Instant,
    result: &Result<T>,
) {
    span.record(
        "operation.duration_ms",
        u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    );
    span.record("operation.success", result.is_ok());
    if let Err(e) = result {
        span.record("error.kind", e.kind());
    }
    metrics::observe(backend, operation, start, result);
}
