//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registry, units, hooks, state stores produce:
//!     → logging.rs (structured log events, one span per component)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`unit`, `component`, `hook`) on every event
//! - Metrics are cheap and optional

pub mod logging;
pub mod metrics;
