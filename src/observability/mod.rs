//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Log fields carry `client_id`, `channel` and `event` so one connection
//!   can be followed across subsystems
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
