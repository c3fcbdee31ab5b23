//! Query executor
//!
//! Runs a validated pipeline against a set of named input batches.
//!
//! Execution flow:
//! 1. Validate stage order and batch names
//! 2. For each stage: check cancellation, run the operator, replace or
//!    publish the named batch
//! 3. Optionally compact the final batch
//! 4. Return the batch written by the last stage

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::aggregate::Aggregator;
use crate::column::Batch;
use crate::error::{EngineError, EngineResult};
use crate::join::Joiner;
use crate::observability::{Event, Logger, MetricsRegistry, ObservationScope};
use crate::project::Projector;
use crate::select::Selector;
use crate::sort::Sorter;

use super::cancel::CancellationToken;
use super::config::EngineConfig;
use super::pipeline::{AggregateSpec, Operator, Pipeline};

/// Executes pipelines under one configuration
///
/// The executor is reusable and may be shared across threads; every query
/// works on its own set of batches.
pub struct QueryExecutor {
    config: EngineConfig,
    logger: Logger,
    metrics: Arc<MetricsRegistry>,
    pool: Option<rayon::ThreadPool>,
}

impl QueryExecutor {
    /// Creates an executor, building a dedicated worker pool when
    /// `worker_threads` is set
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let logger = Logger::from_config(&config.log);

        let pool = match config.worker_threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("colexec-worker-{}", i))
                    .build()
                    .map_err(|e| {
                        let reason = e.to_string();
                        logger.event(Event::WorkerPoolFailed, &[("reason", reason.as_str())]);
                        EngineError::AllocationFailure(format!("worker pool: {}", reason))
                    })?;
                let threads = threads.to_string();
                logger.event(Event::WorkerPoolCreated, &[("threads", threads.as_str())]);
                Some(pool)
            }
            None => None,
        };

        let morsel_size = config.morsel_size.to_string();
        logger.event(
            Event::ConfigLoaded,
            &[
                ("parallel", if config.parallel { "true" } else { "false" }),
                ("morsel_size", morsel_size.as_str()),
            ],
        );

        Ok(Self {
            config,
            logger,
            metrics: Arc::new(MetricsRegistry::new()),
            pool,
        })
    }

    /// Replaces the logger built from the configuration
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Executes `pipeline` over `inputs`.
    ///
    /// Input batches are never modified; stages work on views and new
    /// batches owned by the query.
    pub fn execute(
        &self,
        pipeline: &Pipeline,
        inputs: &HashMap<String, Batch>,
    ) -> EngineResult<Batch> {
        self.execute_with_cancel(pipeline, inputs, &CancellationToken::new())
    }

    /// Executes `pipeline`, checking `cancel` before every stage
    pub fn execute_with_cancel(
        &self,
        pipeline: &Pipeline,
        inputs: &HashMap<String, Batch>,
        cancel: &CancellationToken,
    ) -> EngineResult<Batch> {
        let query_id = Uuid::new_v4().to_string();
        let stage_count = pipeline.len().to_string();
        let scope = ObservationScope::with_fields(
            &self.logger,
            "QUERY",
            &[("query_id", query_id.as_str()), ("stages", stage_count.as_str())],
        );

        if let Err(err) = pipeline.validate(inputs.keys().map(String::as_str)) {
            let reason = err.to_string();
            self.logger.event(
                Event::PipelineRejected,
                &[("query_id", query_id.as_str()), ("reason", reason.as_str())],
            );
            self.metrics.increment_queries_failed();
            scope.fail(err.code(), &reason);
            return Err(err);
        }

        let run = || self.run_stages(&query_id, pipeline, inputs, cancel);
        let result = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        match result {
            Ok(batch) => {
                self.metrics.increment_queries_executed();
                let rows = batch.row_count().to_string();
                scope.complete_with_fields(&[("rows_out", rows.as_str())]);
                Ok(batch)
            }
            Err(err) => {
                match &err {
                    EngineError::Cancelled(stage) => {
                        self.metrics.increment_queries_cancelled();
                        self.logger.event(
                            Event::QueryCancelled,
                            &[("query_id", query_id.as_str()), ("stage", stage.as_str())],
                        );
                    }
                    EngineError::AllocationFailure(reason) => {
                        self.metrics.increment_queries_failed();
                        self.logger.event(
                            Event::AllocationFailed,
                            &[("query_id", query_id.as_str()), ("reason", reason.as_str())],
                        );
                    }
                    _ => self.metrics.increment_queries_failed(),
                }
                let reason = err.to_string();
                if err.is_fatal() {
                    scope.fail_fatal(err.code(), &reason);
                } else {
                    scope.fail(err.code(), &reason);
                }
                Err(err)
            }
        }
    }

    fn run_stages(
        &self,
        query_id: &str,
        pipeline: &Pipeline,
        inputs: &HashMap<String, Batch>,
        cancel: &CancellationToken,
    ) -> EngineResult<Batch> {
        let mut working: HashMap<String, Batch> = inputs.clone();
        let mut last_output = String::new();

        for (index, op) in pipeline.operators.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled(op.name().to_string()));
            }

            let stage = index.to_string();
            let scope = ObservationScope::with_fields(
                &self.logger,
                "STAGE",
                &[
                    ("query_id", query_id),
                    ("stage", stage.as_str()),
                    ("op", op.name()),
                ],
            );
            match self.run_operator(query_id, op, &mut working) {
                Ok(rows) => {
                    self.metrics.increment_stages();
                    let rows = rows.to_string();
                    scope.complete_with_fields(&[("rows_out", rows.as_str())]);
                }
                Err(err) => {
                    let reason = err.to_string();
                    if err.is_fatal() {
                        scope.fail_fatal(err.code(), &reason);
                    } else {
                        scope.fail(err.code(), &reason);
                    }
                    return Err(err);
                }
            }
            last_output = op.output().to_string();
        }

        let result = take_batch(&mut working, &last_output)?;
        Ok(if self.config.compact_output {
            result.compact()
        } else {
            result
        })
    }

    /// Runs one operator and returns the row count of the batch it wrote
    fn run_operator(
        &self,
        query_id: &str,
        op: &Operator,
        working: &mut HashMap<String, Batch>,
    ) -> EngineResult<usize> {
        let parallelism = self.config.parallelism();
        let output = match op {
            Operator::Filter { input, predicate } => {
                let batch = take_batch(working, input)?;
                let mask = Selector::select_with(&batch, predicate, parallelism)?;
                self.metrics
                    .add_selection(batch.row_count() as u64, mask.count() as u64);
                (input.clone(), batch.filter(&mask))
            }
            Operator::Join {
                build,
                probe,
                on,
                output,
            } => {
                let build_batch = take_batch(working, build)?;
                let probe_batch = take_batch(working, probe)?;
                let (joined, stats) = Joiner::join_with(
                    &build_batch,
                    &probe_batch,
                    on,
                    &self.config.join_options(),
                )?;
                if stats.limit_exceeded {
                    self.metrics.increment_cardinality_warnings();
                    let produced = stats.output_rows.to_string();
                    let limit = self
                        .config
                        .cardinality_limit
                        .map(|l| l.to_string())
                        .unwrap_or_default();
                    self.logger.event(
                        Event::CardinalityWarning,
                        &[
                            ("query_id", query_id),
                            ("produced", produced.as_str()),
                            ("limit", limit.as_str()),
                        ],
                    );
                }
                self.metrics.add_join_rows(stats.output_rows as u64);
                (output.clone(), joined)
            }
            Operator::Project { input, columns } => {
                let batch = take_batch(working, input)?;
                (input.clone(), Projector::project(&batch, columns)?)
            }
            Operator::Aggregate {
                input,
                group_by,
                aggregates,
            } => {
                let batch = take_batch(working, input)?;
                let exprs = aggregates
                    .iter()
                    .map(AggregateSpec::resolve)
                    .collect::<EngineResult<Vec<_>>>()?;
                let grouped = Aggregator::aggregate_with(&batch, group_by, &exprs, parallelism)?;
                self.metrics.add_groups(grouped.row_count() as u64);
                (input.clone(), grouped)
            }
            Operator::Sort { input, keys } => {
                let batch = take_batch(working, input)?;
                let sorted = Sorter::sort_batch(&batch, keys, parallelism)?;
                self.metrics.add_rows_sorted(sorted.row_count() as u64);
                (input.clone(), sorted)
            }
            Operator::Limit { input, count } => {
                let batch = take_batch(working, input)?;
                let end = (*count).min(batch.row_count());
                (input.clone(), batch.slice(0..end))
            }
        };

        let (name, batch) = output;
        let rows = batch.row_count();
        working.insert(name, batch);
        Ok(rows)
    }
}

fn take_batch(working: &mut HashMap<String, Batch>, name: &str) -> EngineResult<Batch> {
    working
        .remove(name)
        .ok_or_else(|| EngineError::InvalidPipeline(format!("unknown batch '{}'", name)))
}

/// Executes `pipeline` with the default serial configuration
pub fn execute(pipeline: &Pipeline, inputs: &HashMap<String, Batch>) -> EngineResult<Batch> {
    QueryExecutor::new(EngineConfig::default())?.execute(pipeline, inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateExpr;
    use crate::column::ColumnBuffer;
    use crate::join::{CardinalityPolicy, JoinKey};
    use crate::observability::Severity;
    use crate::select::Predicate;
    use crate::sort::SortKey;

    fn inputs() -> HashMap<String, Batch> {
        let t = Batch::try_new(vec![
            ("key", ColumnBuffer::from_i64(vec![1, 1, 2, 2, 3])),
            ("val", ColumnBuffer::from_i64(vec![10, 20, 30, 40, 50])),
        ])
        .unwrap();
        let mut map = HashMap::new();
        map.insert("t".to_string(), t);
        map
    }

    fn group_and_sort() -> Pipeline {
        Pipeline::new()
            .aggregate("t", ["key"], vec![AggregateExpr::sum("val")])
            .sort("t", vec![SortKey::asc("key")])
    }

    #[test]
    fn test_group_sum_then_sort() {
        let out = execute(&group_and_sort(), &inputs()).unwrap();
        assert_eq!(out.column_names(), vec!["key", "val_sum"]);
        let keys: Vec<Option<i64>> = (0..3).map(|r| out.column("key").unwrap().i64_at(r)).collect();
        let sums: Vec<Option<i64>> = (0..3)
            .map(|r| out.column("val_sum").unwrap().i64_at(r))
            .collect();
        assert_eq!(keys, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(sums, vec![Some(30), Some(70), Some(50)]);
    }

    #[test]
    fn test_inputs_untouched() {
        let inputs = inputs();
        let _ = execute(&group_and_sort(), &inputs).unwrap();
        assert_eq!(inputs["t"].row_count(), 5);
    }

    #[test]
    fn test_cancelled_before_first_stage() {
        let executor = QueryExecutor::new(EngineConfig::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = executor
            .execute_with_cancel(&group_and_sort(), &inputs(), &token)
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled("aggregate".to_string()));
        assert_eq!(executor.metrics().snapshot().queries_cancelled, 1);
    }

    #[test]
    fn test_unknown_reduction_surfaces_at_aggregate() {
        let pipeline = Pipeline::from_operators(vec![Operator::Aggregate {
            input: "t".into(),
            group_by: vec!["key".into()],
            aggregates: vec![AggregateSpec::new("val", "median")],
        }]);
        let err = execute(&pipeline, &inputs()).unwrap_err();
        assert_eq!(err.code(), "COLEXEC_UNKNOWN_REDUCTION");
    }

    #[test]
    fn test_limit_clamps() {
        let pipeline = Pipeline::new().limit("t", 100);
        assert_eq!(execute(&pipeline, &inputs()).unwrap().row_count(), 5);
        let pipeline = Pipeline::new().filter("t", Predicate::gt("val", 15)).limit("t", 2);
        let out = execute(&pipeline, &inputs()).unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.column("val").unwrap().i64_at(0), Some(20));
    }

    #[test]
    fn test_query_logging_and_metrics() {
        let executor = QueryExecutor::new(EngineConfig::default())
            .unwrap()
            .with_logger(Logger::memory(Severity::Info));
        executor.execute(&group_and_sort(), &inputs()).unwrap();

        let lines = executor.logger().captured();
        assert!(lines.first().unwrap().contains("\"event\":\"QUERY_BEGIN\""));
        assert!(lines.last().unwrap().contains("\"event\":\"QUERY_COMPLETE\""));
        assert_eq!(
            lines.iter().filter(|l| l.contains("STAGE_COMPLETE")).count(),
            2
        );

        let snapshot = executor.metrics().snapshot();
        assert_eq!(snapshot.queries_executed, 1);
        assert_eq!(snapshot.stages_executed, 2);
        assert_eq!(snapshot.groups_emitted, 3);
        assert_eq!(snapshot.rows_sorted, 3);
    }

    #[test]
    fn test_cardinality_warning_logged() {
        let mut config = EngineConfig::default();
        config.cardinality_limit = Some(2);
        config.cardinality_policy = CardinalityPolicy::Warn;
        let executor = QueryExecutor::new(config)
            .unwrap()
            .with_logger(Logger::memory(Severity::Warn));

        let mut inputs = inputs();
        let other = Batch::try_new(vec![("k", ColumnBuffer::from_i64(vec![1, 1, 2]))]).unwrap();
        inputs.insert("u".to_string(), other);
        let pipeline = Pipeline::new().join("u", "t", vec![JoinKey::new("k", "key")], "ut");

        let out = executor.execute(&pipeline, &inputs).unwrap();
        assert_eq!(out.row_count(), 6);
        assert!(executor
            .logger()
            .captured()
            .iter()
            .any(|l| l.contains("JOIN_CARDINALITY_WARNING")));
        assert_eq!(executor.metrics().snapshot().cardinality_warnings, 1);
    }

    #[test]
    fn test_rejected_pipeline() {
        let executor = QueryExecutor::new(EngineConfig::default())
            .unwrap()
            .with_logger(Logger::memory(Severity::Info));
        let pipeline = Pipeline::new().sort("missing", vec![SortKey::asc("key")]);
        let err = executor.execute(&pipeline, &inputs()).unwrap_err();
        assert_eq!(err.code(), "COLEXEC_INVALID_PIPELINE");
        let lines = executor.logger().captured();
        assert!(lines.iter().any(|l| l.contains("PIPELINE_REJECTED")));
        assert!(lines.iter().any(|l| l.contains("QUERY_FAILED")));
    }

    #[test]
    fn test_dedicated_pool_matches_serial() {
        let mut config = EngineConfig::parallel();
        config.worker_threads = Some(2);
        config.morsel_size = 2;
        config.compact_output = true;
        let executor = QueryExecutor::new(config).unwrap();
        let parallel = executor.execute(&group_and_sort(), &inputs()).unwrap();
        let serial = execute(&group_and_sort(), &inputs()).unwrap();
        assert_eq!(parallel, serial);
        assert!(!parallel.is_view());
    }
}
