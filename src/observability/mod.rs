//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Every pipeline log line carries the request id
//! - Metrics are cheap (atomic increments) and off unless an exporter runs

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
