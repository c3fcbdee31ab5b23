//! Observability subsystem
//!
//! Provides:
//! - Structured logging (JSON lines) to an explicit sink
//! - Atomic counters with serialisable snapshots
//! - Scope-based lifecycle tracing for queries and stages
//!
//! # Principles
//!
//! 1. Observability is read-only: it never changes a query's result
//! 2. No background threads
//! 3. Silent by default; nothing is written unless a sink is configured
//!
//! # Usage
//!
//! ```ignore
//! use colexec::observability::{Logger, MetricsRegistry, ObservationScope, Severity};
//!
//! let logger = Logger::memory(Severity::Info);
//! let scope = ObservationScope::new(&logger, "QUERY");
//! // ... do work ...
//! scope.complete();
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_queries_executed();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{LogConfig, LogSink, Logger, Severity, SinkKind};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};
