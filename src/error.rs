//! Engine error types
//!
//! Every operator reports failures at its own boundary using one of the
//! kinds below. Errors carry a stable string code and a severity:
//!
//! - COLEXEC_TYPE_MISMATCH (ERROR)
//! - COLEXEC_UNKNOWN_COLUMN (ERROR)
//! - COLEXEC_UNKNOWN_REDUCTION (ERROR)
//! - COLEXEC_ROW_COUNT_MISMATCH (ERROR)
//! - COLEXEC_DUPLICATE_COLUMN (ERROR)
//! - COLEXEC_CARDINALITY_EXPLOSION (ERROR)
//! - COLEXEC_ARITHMETIC_OVERFLOW (ERROR)
//! - COLEXEC_ALLOCATION_FAILURE (FATAL)
//! - COLEXEC_INVALID_PIPELINE (ERROR)
//! - COLEXEC_INVALID_CONFIG (ERROR)
//! - COLEXEC_CANCELLED (ERROR)

use std::fmt;

use thiserror::Error;

/// Severity levels for engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The query failed; the engine is healthy
    Error,
    /// The environment failed; the pipeline must not continue
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Engine error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("unknown reduction: {0}")]
    UnknownReduction(String),

    #[error("row count mismatch: column '{column}' has {actual} rows, expected {expected}")]
    RowCountMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("join produced {produced} rows, limit is {limit}")]
    CardinalityExplosion { produced: usize, limit: usize },

    #[error("arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("query cancelled before stage '{0}'")]
    Cancelled(String),
}

impl EngineError {
    pub(crate) fn type_mismatch(reason: impl Into<String>) -> Self {
        EngineError::TypeMismatch(reason.into())
    }

    pub(crate) fn unknown_column(name: impl Into<String>) -> Self {
        EngineError::UnknownColumn(name.into())
    }

    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::TypeMismatch(_) => "COLEXEC_TYPE_MISMATCH",
            EngineError::UnknownColumn(_) => "COLEXEC_UNKNOWN_COLUMN",
            EngineError::UnknownReduction(_) => "COLEXEC_UNKNOWN_REDUCTION",
            EngineError::RowCountMismatch { .. } => "COLEXEC_ROW_COUNT_MISMATCH",
            EngineError::DuplicateColumn(_) => "COLEXEC_DUPLICATE_COLUMN",
            EngineError::CardinalityExplosion { .. } => "COLEXEC_CARDINALITY_EXPLOSION",
            EngineError::ArithmeticOverflow(_) => "COLEXEC_ARITHMETIC_OVERFLOW",
            EngineError::AllocationFailure(_) => "COLEXEC_ALLOCATION_FAILURE",
            EngineError::InvalidPipeline(_) => "COLEXEC_INVALID_PIPELINE",
            EngineError::InvalidConfig(_) => "COLEXEC_INVALID_CONFIG",
            EngineError::Cancelled(_) => "COLEXEC_CANCELLED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            EngineError::AllocationFailure(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::type_mismatch("x").code(),
            "COLEXEC_TYPE_MISMATCH"
        );
        assert_eq!(
            EngineError::unknown_column("x").code(),
            "COLEXEC_UNKNOWN_COLUMN"
        );
        assert_eq!(
            EngineError::CardinalityExplosion {
                produced: 10,
                limit: 5
            }
            .code(),
            "COLEXEC_CARDINALITY_EXPLOSION"
        );
    }

    #[test]
    fn test_allocation_failure_is_fatal() {
        let err = EngineError::AllocationFailure("pool".into());
        assert!(err.is_fatal());
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn test_type_mismatch_not_fatal() {
        let err = EngineError::type_mismatch("int32 vs string");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::RowCountMismatch {
            column: "val".into(),
            expected: 5,
            actual: 4,
        };
        let display = err.to_string();
        assert!(display.contains("'val'"));
        assert!(display.contains("4 rows"));
    }
}
