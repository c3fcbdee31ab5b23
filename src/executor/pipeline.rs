//! Pipeline descriptors
//!
//! A pipeline is an ordered list of operators over named batches. Operators
//! run in a fixed canonical order:
//!
//! filter* → join* → project? → aggregate? → sort? → limit?
//!
//! Filter, project, aggregate, sort and limit replace the batch they name.
//! A join consumes its two inputs and publishes its output under a new name.
//! The pipeline result is whatever the last operator wrote.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateExpr;
use crate::error::{EngineError, EngineResult};
use crate::join::JoinKey;
use crate::project::Projection;
use crate::select::Predicate;
use crate::sort::SortKey;

/// `(column, reduction)` as written in a pipeline; the reduction name is
/// checked when the aggregate stage runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub column: String,
    pub reduction: String,
}

impl AggregateSpec {
    pub fn new(column: impl Into<String>, reduction: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            reduction: reduction.into(),
        }
    }

    pub fn resolve(&self) -> EngineResult<AggregateExpr> {
        AggregateExpr::parse(self.column.clone(), &self.reduction)
    }
}

impl From<AggregateExpr> for AggregateSpec {
    fn from(expr: AggregateExpr) -> Self {
        Self {
            reduction: expr.reduction.name().to_string(),
            column: expr.column,
        }
    }
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operator {
    Filter {
        input: String,
        predicate: Predicate,
    },
    Join {
        build: String,
        probe: String,
        on: Vec<JoinKey>,
        output: String,
    },
    Project {
        input: String,
        columns: Vec<Projection>,
    },
    Aggregate {
        input: String,
        #[serde(default)]
        group_by: Vec<String>,
        aggregates: Vec<AggregateSpec>,
    },
    Sort {
        input: String,
        keys: Vec<SortKey>,
    },
    Limit {
        input: String,
        count: usize,
    },
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Filter { .. } => "filter",
            Operator::Join { .. } => "join",
            Operator::Project { .. } => "project",
            Operator::Aggregate { .. } => "aggregate",
            Operator::Sort { .. } => "sort",
            Operator::Limit { .. } => "limit",
        }
    }

    /// Position in the canonical order
    fn rank(&self) -> u8 {
        match self {
            Operator::Filter { .. } => 0,
            Operator::Join { .. } => 1,
            Operator::Project { .. } => 2,
            Operator::Aggregate { .. } => 3,
            Operator::Sort { .. } => 4,
            Operator::Limit { .. } => 5,
        }
    }

    /// Whether the stage may appear more than once
    fn repeatable(&self) -> bool {
        matches!(self, Operator::Filter { .. } | Operator::Join { .. })
    }

    /// Name of the batch this stage writes
    pub fn output(&self) -> &str {
        match self {
            Operator::Join { output, .. } => output,
            Operator::Filter { input, .. }
            | Operator::Project { input, .. }
            | Operator::Aggregate { input, .. }
            | Operator::Sort { input, .. }
            | Operator::Limit { input, .. } => input,
        }
    }
}

/// An ordered list of operators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub operators: Vec<Operator>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_operators(operators: Vec<Operator>) -> Self {
        Self { operators }
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidPipeline(format!("invalid pipeline JSON: {}", e)))
    }

    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string(self).map_err(|e| {
            EngineError::InvalidPipeline(format!("cannot serialize pipeline: {}", e))
        })
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn push(mut self, operator: Operator) -> Self {
        self.operators.push(operator);
        self
    }

    pub fn filter(self, input: impl Into<String>, predicate: Predicate) -> Self {
        self.push(Operator::Filter {
            input: input.into(),
            predicate,
        })
    }

    pub fn join(
        self,
        build: impl Into<String>,
        probe: impl Into<String>,
        on: Vec<JoinKey>,
        output: impl Into<String>,
    ) -> Self {
        self.push(Operator::Join {
            build: build.into(),
            probe: probe.into(),
            on,
            output: output.into(),
        })
    }

    pub fn project(self, input: impl Into<String>, columns: Vec<Projection>) -> Self {
        self.push(Operator::Project {
            input: input.into(),
            columns,
        })
    }

    pub fn aggregate<S: Into<String>>(
        self,
        input: impl Into<String>,
        group_by: impl IntoIterator<Item = S>,
        aggregates: Vec<AggregateExpr>,
    ) -> Self {
        self.push(Operator::Aggregate {
            input: input.into(),
            group_by: group_by.into_iter().map(Into::into).collect(),
            aggregates: aggregates.into_iter().map(AggregateSpec::from).collect(),
        })
    }

    pub fn sort(self, input: impl Into<String>, keys: Vec<SortKey>) -> Self {
        self.push(Operator::Sort {
            input: input.into(),
            keys,
        })
    }

    pub fn limit(self, input: impl Into<String>, count: usize) -> Self {
        self.push(Operator::Limit {
            input: input.into(),
            count,
        })
    }

    /// Checks stage order and batch names against the available inputs.
    ///
    /// Column names and types are checked by each operator when it runs.
    pub fn validate<'a>(&self, inputs: impl IntoIterator<Item = &'a str>) -> EngineResult<()> {
        if self.operators.is_empty() {
            return Err(EngineError::InvalidPipeline(
                "pipeline has no operators".to_string(),
            ));
        }

        let mut available: HashSet<String> = inputs.into_iter().map(str::to_string).collect();
        let mut last_rank = 0u8;
        for (i, op) in self.operators.iter().enumerate() {
            let rank = op.rank();
            if i > 0 && (rank < last_rank || (rank == last_rank && !op.repeatable())) {
                return Err(EngineError::InvalidPipeline(format!(
                    "stage {} ({}) is out of order; expected filter, join, project, aggregate, sort, limit",
                    i,
                    op.name()
                )));
            }
            last_rank = rank;

            let require = |name: &str, available: &HashSet<String>| {
                if available.contains(name) {
                    Ok(())
                } else {
                    Err(EngineError::InvalidPipeline(format!(
                        "stage {} ({}) reads unknown batch '{}'",
                        i,
                        op.name(),
                        name
                    )))
                }
            };
            match op {
                Operator::Join {
                    build,
                    probe,
                    output,
                    ..
                } => {
                    require(build, &available)?;
                    require(probe, &available)?;
                    if build == probe {
                        return Err(EngineError::InvalidPipeline(format!(
                            "stage {} (join) uses '{}' as both inputs",
                            i, build
                        )));
                    }
                    available.remove(build);
                    available.remove(probe);
                    if !available.insert(output.clone()) {
                        return Err(EngineError::InvalidPipeline(format!(
                            "stage {} (join) output '{}' shadows an existing batch",
                            i, output
                        )));
                    }
                }
                other => require(other.output(), &available)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn q1_like() -> Pipeline {
        Pipeline::new()
            .filter(
                "lineitem",
                Predicate::lte("l_shipdate", NaiveDate::from_ymd_opt(1998, 9, 2).unwrap()),
            )
            .aggregate(
                "lineitem",
                ["l_returnflag"],
                vec![AggregateExpr::sum("l_quantity")],
            )
            .sort("lineitem", vec![SortKey::asc("l_returnflag")])
    }

    #[test]
    fn test_canonical_order_accepted() {
        assert!(q1_like().validate(["lineitem"]).is_ok());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let p = Pipeline::new()
            .sort("t", vec![SortKey::asc("k")])
            .filter("t", Predicate::eq("k", 1));
        let err = p.validate(["t"]).unwrap_err();
        assert_eq!(err.code(), "COLEXEC_INVALID_PIPELINE");

        let twice = Pipeline::new()
            .sort("t", vec![SortKey::asc("k")])
            .sort("t", vec![SortKey::desc("k")]);
        assert!(twice.validate(["t"]).is_err());
    }

    #[test]
    fn test_empty_and_unknown_inputs_rejected() {
        assert!(Pipeline::new().validate(["t"]).is_err());
        assert!(q1_like().validate(["orders"]).is_err());
    }

    #[test]
    fn test_join_consumes_inputs() {
        let p = Pipeline::new()
            .join("a", "b", vec![JoinKey::new("k", "k")], "ab")
            .filter("a", Predicate::eq("k", 1));
        // filter after join is out of order regardless of names
        assert!(p.validate(["a", "b"]).is_err());

        let p = Pipeline::new()
            .join("a", "b", vec![JoinKey::new("k", "k")], "ab")
            .sort("a", vec![SortKey::asc("k")]);
        assert!(p.validate(["a", "b"]).is_err());

        let p = Pipeline::new()
            .join("a", "b", vec![JoinKey::new("k", "k")], "ab")
            .join("ab", "c", vec![JoinKey::new("k", "k")], "abc")
            .sort("abc", vec![SortKey::asc("k")]);
        assert!(p.validate(["a", "b", "c"]).is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let p = q1_like();
        let json = p.to_json().unwrap();
        assert!(json.contains(r#""op":"filter""#));
        let back = Pipeline::from_json(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_handwritten_json() {
        let json = r#"{"operators": [
            {"op": "aggregate", "input": "t", "group_by": ["key"],
             "aggregates": [{"column": "val", "reduction": "sum"}]},
            {"op": "sort", "input": "t", "keys": [{"column": "key"}]}
        ]}"#;
        let p = Pipeline::from_json(json).unwrap();
        assert_eq!(p.len(), 2);
        assert!(p.validate(["t"]).is_ok());

        let err = Pipeline::from_json(r#"{"operators": [{"op": "explode"}]}"#).unwrap_err();
        assert_eq!(err.code(), "COLEXEC_INVALID_PIPELINE");
    }

    #[test]
    fn test_aggregate_spec_resolution() {
        assert_eq!(
            AggregateSpec::new("val", "count_distinct").resolve().unwrap(),
            AggregateExpr::count_distinct("val")
        );
        assert_eq!(
            AggregateSpec::new("val", "p99").resolve().unwrap_err().code(),
            "COLEXEC_UNKNOWN_REDUCTION"
        );
    }
}
