//! # Store Metrics
//!
//! Per-backend operation counters, error counters and latency histograms.

use crate::error::StoreError;
use anyhow::Result;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Instant;

/// Global Prometheus metrics registry
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_store_operations_total",
            "Total number of store operations",
        ),
        &["backend", "operation"],
    )
    .expect("Failed to create OPERATIONS_TOTAL metric - this should never happen")
});

static OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_store_operation_errors_total",
            "Total number of failed store operations",
        ),
        &["backend", "operation", "kind"],
    )
    .expect("Failed to create OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "secret_store_operation_duration_seconds",
            "Duration of store operations in seconds",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["backend", "operation"],
    )
    .expect("Failed to create OPERATION_DURATION metric - this should never happen")
});

static RETRIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_store_retries_total",
            "Total number of retried backend calls",
        ),
        &["operation"],
    )
    .expect("Failed to create RETRIES_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry
///
/// Safe to call more than once.
#[allow(
    clippy::missing_errors_doc,
    reason = "Only fails if a metric descriptor is invalid"
)]
pub fn register_metrics() -> Result<()> {
    let collectors: [Box<dyn prometheus::core::Collector>; 4] = [
        Box::new(OPERATIONS_TOTAL.clone()),
        Box::new(OPERATION_ERRORS_TOTAL.clone()),
        Box::new(OPERATION_DURATION.clone()),
        Box::new(RETRIES_TOTAL.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Render the registry in the Prometheus text exposition format
#[allow(
    clippy::missing_errors_doc,
    reason = "Only fails on encoder I/O errors"
)]
pub fn encode_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn record_store_operation(backend: &str, operation: &str, duration: f64) {
    OPERATIONS_TOTAL
        .with_label_values(&[backend, operation])
        .inc();
    OPERATION_DURATION
        .with_label_values(&[backend, operation])
        .observe(duration);
}

pub fn increment_store_operation_errors(backend: &str, operation: &str, kind: &str) {
    OPERATION_ERRORS_TOTAL
        .with_label_values(&[backend, operation, kind])
        .inc();
}

pub fn increment_retries(operation: &str) {
    RETRIES_TOTAL.with_label_values(&[operation]).inc();
}

/// Record the outcome of a store operation started at `start`
///
/// `NotFound` is an expected answer, not a failure, and is not counted as an error.
pub fn observe<T>(backend: &str, operation: &str, start: Instant, result: &Result<T, StoreError>) {
    record_store_operation(backend, operation, start.elapsed().as_secs_f64());
    if let Err(e) = result {
        if !e.is_not_found() {
            increment_store_operation_errors(backend, operation, e.kind());
        }
    }
}
