//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Gate Metrics
    pub static ref GATE_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("aventra_gate_decisions_total", "Total number of request gate decisions"),
        &["decision"]
    ).expect("metric can be created");

    // Identity Service Metrics
    pub static ref IDENTITY_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("aventra_identity_requests_total", "Total number of identity service requests"),
        &["operation", "outcome"]
    ).expect("metric can be created");
    pub static ref IDENTITY_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "aventra_identity_request_duration_seconds",
            "Identity service request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("aventra_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(GATE_DECISIONS_TOTAL.clone()))
        .expect("GATE_DECISIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(IDENTITY_REQUESTS_TOTAL.clone()))
        .expect("IDENTITY_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(IDENTITY_REQUEST_DURATION_SECONDS.clone()))
        .expect("IDENTITY_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
