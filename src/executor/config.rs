//! Engine configuration
//!
//! Loaded from JSON. Every field is optional; omitted fields take the
//! defaults below. Defaults are conservative: serial execution, no
//! cardinality limit, logging disabled.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::join::{BuildSide, CardinalityPolicy, JoinOptions, JoinStrategy};
use crate::observability::LogConfig;
use crate::parallel::{Parallelism, DEFAULT_MORSEL_SIZE};

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run operators on the rayon pool
    #[serde(default)]
    pub parallel: bool,

    /// Size of a dedicated worker pool; the global pool when absent
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Rows per morsel (must be > 0)
    #[serde(default = "default_morsel_size")]
    pub morsel_size: usize,

    /// Hash or sort-merge join
    #[serde(default)]
    pub join_strategy: JoinStrategy,

    /// Which join input is hashed
    #[serde(default)]
    pub join_build_side: BuildSide,

    /// Join output row threshold (none when absent)
    #[serde(default)]
    pub cardinality_limit: Option<usize>,

    /// Reaction to a join above `cardinality_limit`
    #[serde(default)]
    pub cardinality_policy: CardinalityPolicy,

    /// Copy the final batch into owned buffers instead of returning views
    #[serde(default)]
    pub compact_output: bool,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_morsel_size() -> usize {
    DEFAULT_MORSEL_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            worker_threads: None,
            morsel_size: DEFAULT_MORSEL_SIZE,
            join_strategy: JoinStrategy::default(),
            join_build_side: BuildSide::default(),
            cardinality_limit: None,
            cardinality_policy: CardinalityPolicy::default(),
            compact_output: false,
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Serial execution with default settings
    pub fn serial() -> Self {
        Self::default()
    }

    /// Parallel execution on the global pool
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidConfig(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.morsel_size == 0 {
            return Err(EngineError::InvalidConfig(
                "morsel_size must be > 0".to_string(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(EngineError::InvalidConfig(
                "worker_threads must be > 0 when set".to_string(),
            ));
        }
        if self.worker_threads.is_some() && !self.parallel {
            return Err(EngineError::InvalidConfig(
                "worker_threads requires parallel = true".to_string(),
            ));
        }
        Ok(())
    }

    pub fn parallelism(&self) -> Parallelism {
        Parallelism {
            enabled: self.parallel,
            morsel_size: self.morsel_size,
        }
    }

    pub fn join_options(&self) -> JoinOptions {
        JoinOptions {
            strategy: self.join_strategy,
            build_side: self.join_build_side,
            cardinality_limit: self.cardinality_limit,
            cardinality_policy: self.cardinality_policy,
            parallelism: self.parallelism(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{Severity, SinkKind};

    #[test]
    fn test_config_default_serial() {
        let config = EngineConfig::default();
        assert!(!config.parallel);
        assert_eq!(config.morsel_size, DEFAULT_MORSEL_SIZE);
        assert_eq!(config.join_build_side, BuildSide::Smaller);
        assert_eq!(config.join_strategy, JoinStrategy::Hash);
        assert_eq!(config.log.sink, SinkKind::Disabled);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"parallel": true, "cardinality_limit": 1000, "cardinality_policy": "abort",
                "log": {"level": "warn"}}"#,
        )
        .unwrap();
        assert!(config.parallel);
        assert_eq!(config.cardinality_limit, Some(1000));
        assert_eq!(config.cardinality_policy, CardinalityPolicy::Abort);
        assert_eq!(config.log.level, Severity::Warn);
        assert_eq!(config.log.sink, SinkKind::Disabled);
        assert_eq!(config.morsel_size, DEFAULT_MORSEL_SIZE);
    }

    #[test]
    fn test_sort_merge_strategy_reaches_join_options() {
        let config = EngineConfig::from_json_str(r#"{"join_strategy": "sort_merge"}"#).unwrap();
        assert_eq!(config.join_options().strategy, JoinStrategy::SortMerge);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_json_str(r#"{"morsel_size": 0}"#).unwrap_err();
        assert_eq!(err.code(), "COLEXEC_INVALID_CONFIG");

        let err = EngineConfig::from_json_str(r#"{"worker_threads": 4}"#).unwrap_err();
        assert_eq!(err.code(), "COLEXEC_INVALID_CONFIG");

        let err = EngineConfig::from_json_str(r#"{"join_build_side": "largest"}"#).unwrap_err();
        assert_eq!(err.code(), "COLEXEC_INVALID_CONFIG");
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/colexec.json")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }
}
