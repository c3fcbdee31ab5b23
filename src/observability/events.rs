//! Observable engine events
//!
//! Query and stage lifecycles are logged through `ObservationScope`
//! (`QUERY_BEGIN`, `STAGE_COMPLETE`, ...). The events below are the
//! standalone ones that happen outside a scope's begin/end pair.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Engine lifecycle
    /// Configuration accepted
    ConfigLoaded,
    /// Dedicated worker pool built
    WorkerPoolCreated,
    /// Worker pool could not be built (FATAL)
    WorkerPoolFailed,

    // Query
    /// Pipeline failed validation before any stage ran
    PipelineRejected,
    /// Cancellation observed at a stage boundary
    QueryCancelled,

    // Operators
    /// Join output exceeded the configured cardinality limit
    CardinalityWarning,
    /// Environment refused an allocation (FATAL)
    AllocationFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::WorkerPoolCreated => "WORKER_POOL_CREATED",
            Event::WorkerPoolFailed => "WORKER_POOL_FAILED",
            Event::PipelineRejected => "PIPELINE_REJECTED",
            Event::QueryCancelled => "QUERY_CANCELLED",
            Event::CardinalityWarning => "JOIN_CARDINALITY_WARNING",
            Event::AllocationFailed => "ALLOCATION_FAILED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::WorkerPoolFailed | Event::AllocationFailed)
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::ConfigLoaded | Event::WorkerPoolCreated => Severity::Info,
            Event::PipelineRejected => Severity::Error,
            Event::QueryCancelled | Event::CardinalityWarning => Severity::Warn,
            Event::WorkerPoolFailed | Event::AllocationFailed => Severity::Fatal,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
