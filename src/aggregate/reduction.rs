//! Reduction kinds and aggregate expressions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::column::DataType;
use crate::error::{EngineError, EngineResult};

/// Per-group reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Sum,
    Mean,
    Count,
    CountDistinct,
}

impl Reduction {
    pub fn name(&self) -> &'static str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Mean => "mean",
            Reduction::Count => "count",
            Reduction::CountDistinct => "count_distinct",
        }
    }

    /// Type of the reduced column for an input of type `input`
    pub fn output_type(&self, input: DataType) -> EngineResult<DataType> {
        match self {
            Reduction::Sum | Reduction::Mean if !input.is_numeric() => Err(
                EngineError::type_mismatch(format!("cannot {} a {} column", self.name(), input)),
            ),
            Reduction::Sum if input.is_integer() => Ok(DataType::Int64),
            Reduction::Sum | Reduction::Mean => Ok(DataType::Float64),
            Reduction::Count | Reduction::CountDistinct => Ok(DataType::Int64),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Reduction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Reduction::Sum),
            "mean" => Ok(Reduction::Mean),
            "count" => Ok(Reduction::Count),
            "count_distinct" => Ok(Reduction::CountDistinct),
            other => Err(EngineError::UnknownReduction(other.to_string())),
        }
    }
}

/// One `(column, reduction)` output of an aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub column: String,
    pub reduction: Reduction,
}

impl AggregateExpr {
    pub fn new(column: impl Into<String>, reduction: Reduction) -> Self {
        Self {
            column: column.into(),
            reduction,
        }
    }

    /// Builds an expression from a reduction name such as `"count_distinct"`
    pub fn parse(column: impl Into<String>, reduction: &str) -> EngineResult<Self> {
        Ok(Self::new(column, reduction.parse()?))
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Sum)
    }

    pub fn mean(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Mean)
    }

    pub fn count(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Count)
    }

    pub fn count_distinct(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::CountDistinct)
    }

    /// Output column name, `{column}_{reduction}`
    pub fn output_name(&self) -> String {
        format!("{}_{}", self.column, self.reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reduction() {
        assert_eq!("mean".parse::<Reduction>().unwrap(), Reduction::Mean);
        let err = "median".parse::<Reduction>().unwrap_err();
        assert_eq!(err, EngineError::UnknownReduction("median".into()));
    }

    #[test]
    fn test_output_naming() {
        assert_eq!(AggregateExpr::sum("val").output_name(), "val_sum");
        assert_eq!(
            AggregateExpr::count_distinct("o_orderkey").output_name(),
            "o_orderkey_count_distinct"
        );
    }

    #[test]
    fn test_output_types() {
        assert_eq!(Reduction::Sum.output_type(DataType::Int32).unwrap(), DataType::Int64);
        assert_eq!(Reduction::Sum.output_type(DataType::Float64).unwrap(), DataType::Float64);
        assert_eq!(Reduction::Mean.output_type(DataType::UInt32).unwrap(), DataType::Float64);
        assert_eq!(Reduction::Count.output_type(DataType::Utf8).unwrap(), DataType::Int64);
        assert!(Reduction::Sum.output_type(DataType::Date32).is_err());
        assert!(Reduction::Mean.output_type(DataType::Utf8).is_err());
    }
}
