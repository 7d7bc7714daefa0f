//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! handlers, providers, workflow trigger
//!     → logging.rs (tracing subscriber, pretty or JSON)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request IDs are attached by the HTTP layer and appear on every span
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
