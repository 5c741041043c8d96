//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define runtime metrics (units, hooks, state reads)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `aioli_units_attached_total` (counter): units attached to the registry
//! - `aioli_unit_registration_failures_total` (counter): by error kind
//! - `aioli_hook_duration_seconds` (histogram): by hook and outcome
//! - `aioli_hook_failures_total` (counter): by unit and hook
//! - `aioli_units_degraded` (gauge): units whose startup failed
//! - `aioli_state_reads_total` (counter): by store and outcome
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels stay low-cardinality: unit and store names, never keys

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{BootstrapError, HookKind};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_unit_attached(unit: &str) {
    counter!("aioli_units_attached_total", "unit" => unit.to_string()).increment(1);
}

pub fn record_registration_failure(error: &BootstrapError) {
    counter!(
        "aioli_unit_registration_failures_total",
        "kind" => registration_error_kind(error)
    )
    .increment(1);
}

pub fn record_hook(unit: &str, hook: HookKind, elapsed: Duration, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    histogram!(
        "aioli_hook_duration_seconds",
        "hook" => hook.to_string(),
        "outcome" => outcome
    )
    .record(elapsed.as_secs_f64());

    if !ok {
        counter!(
            "aioli_hook_failures_total",
            "unit" => unit.to_string(),
            "hook" => hook.to_string()
        )
        .increment(1);
    }
}

pub fn set_units_degraded(count: usize) {
    gauge!("aioli_units_degraded").set(count as f64);
}

pub fn record_state_read(store: &str, outcome: &'static str) {
    counter!(
        "aioli_state_reads_total",
        "store" => store.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

fn registration_error_kind(error: &BootstrapError) -> &'static str {
    match error {
        BootstrapError::MissingMetadata | BootstrapError::ConflictingMetadata => "declaration",
        BootstrapError::MetadataUnavailable { .. } => "metadata_unavailable",
        BootstrapError::UnitMeta { .. } => "meta",
        BootstrapError::UnitConfig { .. } => "config",
        BootstrapError::DuplicateUnit(_) => "duplicate_unit",
        BootstrapError::UnresolvedIntegration { .. } => "unresolved_integration",
        BootstrapError::NotConnected { .. } => "not_connected",
        BootstrapError::CyclicDependency { .. } => "cyclic_dependency",
        BootstrapError::DuplicateRoute { .. } => "duplicate_route",
        BootstrapError::InvalidRoute { .. } => "invalid_route",
        BootstrapError::Component { .. } => "component",
        BootstrapError::Config(_) => "settings",
    }
}
