//! Hash aggregation
//!
//! Each morsel builds a private partial: a `KeyedTable` from packed group key
//! to the group's first row, plus one columnar accumulator per reduction
//! indexed by group id. Partials are folded into the first one in morsel
//! order, so group ids, and with them the emitted group order, follow first
//! occurrence in the input.

use crate::column::{Batch, Bitmap, Column, ColumnBuffer, ColumnData, DataType};
use crate::error::{EngineError, EngineResult};
use crate::hash::{KeyPacker, KeyedTable, NullPolicy};
use crate::parallel::Parallelism;

use super::reduction::{AggregateExpr, Reduction};

/// Running state of one reduction, one slot per group
#[derive(Debug)]
enum Accumulator {
    IntSum {
        sums: Vec<i128>,
        seen: Vec<bool>,
    },
    FloatSum {
        sums: Vec<f64>,
        seen: Vec<bool>,
    },
    IntMean {
        sums: Vec<i128>,
        counts: Vec<i64>,
    },
    FloatMean {
        sums: Vec<f64>,
        counts: Vec<i64>,
    },
    Count {
        counts: Vec<i64>,
    },
    /// Distinct values are tracked as `group id ++ packed value` keys
    CountDistinct {
        counts: Vec<i64>,
        seen: KeyedTable<()>,
    },
}

impl Accumulator {
    fn new(reduction: Reduction, input: DataType) -> EngineResult<Self> {
        reduction.output_type(input)?;
        Ok(match reduction {
            Reduction::Sum if input.is_integer() => Accumulator::IntSum {
                sums: Vec::new(),
                seen: Vec::new(),
            },
            Reduction::Sum => Accumulator::FloatSum {
                sums: Vec::new(),
                seen: Vec::new(),
            },
            Reduction::Mean if input.is_integer() => Accumulator::IntMean {
                sums: Vec::new(),
                counts: Vec::new(),
            },
            Reduction::Mean => Accumulator::FloatMean {
                sums: Vec::new(),
                counts: Vec::new(),
            },
            Reduction::Count => Accumulator::Count { counts: Vec::new() },
            Reduction::CountDistinct => Accumulator::CountDistinct {
                counts: Vec::new(),
                seen: KeyedTable::new(),
            },
        })
    }

    /// Extends every slot vector to `groups` entries
    fn resize(&mut self, groups: usize) {
        match self {
            Accumulator::IntSum { sums, seen } => {
                sums.resize(groups, 0);
                seen.resize(groups, false);
            }
            Accumulator::FloatSum { sums, seen } => {
                sums.resize(groups, 0.0);
                seen.resize(groups, false);
            }
            Accumulator::IntMean { sums, counts } => {
                sums.resize(groups, 0);
                counts.resize(groups, 0);
            }
            Accumulator::FloatMean { sums, counts } => {
                sums.resize(groups, 0.0);
                counts.resize(groups, 0);
            }
            Accumulator::Count { counts } | Accumulator::CountDistinct { counts, .. } => {
                counts.resize(groups, 0)
            }
        }
    }

    fn update(
        &mut self,
        group: usize,
        input: &Column,
        value_key: &KeyPacker<'_>,
        row: usize,
        scratch: &mut Vec<u8>,
    ) -> EngineResult<()> {
        if !input.is_valid(row) {
            return Ok(());
        }
        match self {
            Accumulator::IntSum { sums, seen } => {
                sums[group] += input.i64_at(row).unwrap_or_default() as i128;
                seen[group] = true;
            }
            Accumulator::FloatSum { sums, seen } => {
                sums[group] += input.f64_at(row).unwrap_or_default();
                seen[group] = true;
            }
            Accumulator::IntMean { sums, counts } => {
                sums[group] += input.i64_at(row).unwrap_or_default() as i128;
                counts[group] += 1;
            }
            Accumulator::FloatMean { sums, counts } => {
                sums[group] += input.f64_at(row).unwrap_or_default();
                counts[group] += 1;
            }
            Accumulator::Count { counts } => counts[group] += 1,
            Accumulator::CountDistinct { counts, seen } => {
                let mut key = (group as u64).to_le_bytes().to_vec();
                value_key.pack(row, scratch);
                key.extend_from_slice(scratch);
                if seen.entry(&key, || ())?.1 {
                    counts[group] += 1;
                }
            }
        }
        Ok(())
    }

    /// Folds `other` into `self`; `mapping[g]` is the id of `other`'s group
    /// `g` in this partial, which already has `groups` slots.
    fn merge(&mut self, other: Accumulator, mapping: &[usize], groups: usize) -> EngineResult<()> {
        self.resize(groups);
        match (self, other) {
            (
                Accumulator::IntSum { sums, seen },
                Accumulator::IntSum {
                    sums: other_sums,
                    seen: other_seen,
                },
            ) => {
                for (g, (s, v)) in other_sums.into_iter().zip(other_seen).enumerate() {
                    sums[mapping[g]] += s;
                    seen[mapping[g]] |= v;
                }
            }
            (
                Accumulator::FloatSum { sums, seen },
                Accumulator::FloatSum {
                    sums: other_sums,
                    seen: other_seen,
                },
            ) => {
                for (g, (s, v)) in other_sums.into_iter().zip(other_seen).enumerate() {
                    sums[mapping[g]] += s;
                    seen[mapping[g]] |= v;
                }
            }
            (
                Accumulator::IntMean { sums, counts },
                Accumulator::IntMean {
                    sums: other_sums,
                    counts: other_counts,
                },
            ) => {
                for (g, (s, c)) in other_sums.into_iter().zip(other_counts).enumerate() {
                    sums[mapping[g]] += s;
                    counts[mapping[g]] += c;
                }
            }
            (
                Accumulator::FloatMean { sums, counts },
                Accumulator::FloatMean {
                    sums: other_sums,
                    counts: other_counts,
                },
            ) => {
                for (g, (s, c)) in other_sums.into_iter().zip(other_counts).enumerate() {
                    sums[mapping[g]] += s;
                    counts[mapping[g]] += c;
                }
            }
            (Accumulator::Count { counts }, Accumulator::Count { counts: other }) => {
                for (g, c) in other.into_iter().enumerate() {
                    counts[mapping[g]] += c;
                }
            }
            (
                Accumulator::CountDistinct { counts, seen },
                Accumulator::CountDistinct {
                    seen: other_seen, ..
                },
            ) => {
                let mut key = Vec::new();
                for (other_key, _) in other_seen.iter() {
                    let (group_bytes, value) = other_key.split_at(8);
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(group_bytes);
                    let group = mapping[u64::from_le_bytes(raw) as usize];
                    key.clear();
                    key.extend_from_slice(&(group as u64).to_le_bytes());
                    key.extend_from_slice(value);
                    if seen.entry(&key, || ())?.1 {
                        counts[group] += 1;
                    }
                }
            }
            _ => {
                return Err(EngineError::type_mismatch(
                    "partial aggregates disagree on accumulator kind",
                ))
            }
        }
        Ok(())
    }

    fn finish(self, name: &str) -> EngineResult<ColumnBuffer> {
        match self {
            Accumulator::IntSum { sums, seen } => {
                let mut values = Vec::with_capacity(sums.len());
                for sum in sums {
                    values.push(i64::try_from(sum).map_err(|_| {
                        EngineError::ArithmeticOverflow(format!("{} exceeds int64", name))
                    })?);
                }
                with_validity(DataType::Int64, ColumnData::I64(values), &seen)
            }
            Accumulator::FloatSum { sums, seen } => {
                with_validity(DataType::Float64, ColumnData::F64(sums), &seen)
            }
            Accumulator::IntMean { sums, counts } => {
                let means = sums
                    .iter()
                    .zip(&counts)
                    .map(|(s, c)| if *c > 0 { *s as f64 / *c as f64 } else { 0.0 })
                    .collect();
                let seen: Vec<bool> = counts.iter().map(|c| *c > 0).collect();
                with_validity(DataType::Float64, ColumnData::F64(means), &seen)
            }
            Accumulator::FloatMean { sums, counts } => {
                let means = sums
                    .iter()
                    .zip(&counts)
                    .map(|(s, c)| if *c > 0 { *s / *c as f64 } else { 0.0 })
                    .collect();
                let seen: Vec<bool> = counts.iter().map(|c| *c > 0).collect();
                with_validity(DataType::Float64, ColumnData::F64(means), &seen)
            }
            Accumulator::Count { counts } | Accumulator::CountDistinct { counts, .. } => {
                Ok(ColumnBuffer::from_i64(counts))
            }
        }
    }
}

fn with_validity(data_type: DataType, data: ColumnData, seen: &[bool]) -> EngineResult<ColumnBuffer> {
    ColumnBuffer::try_new(
        data_type,
        data,
        Some(Bitmap::from_bools(seen.iter().copied())),
    )
}

/// Per-morsel grouping state
struct Partial {
    /// Packed group key to the first input row of the group
    groups: KeyedTable<usize>,
    accumulators: Vec<Accumulator>,
}

/// Resolved inputs shared by every morsel
struct Plan<'a> {
    keys: KeyPacker<'a>,
    inputs: Vec<&'a Column>,
    /// Single-column packers used to key distinct values
    value_keys: Vec<KeyPacker<'a>>,
    aggregates: &'a [AggregateExpr],
}

impl<'a> Plan<'a> {
    fn new<S: AsRef<str>>(
        batch: &'a Batch,
        group_by: &[S],
        aggregates: &'a [AggregateExpr],
    ) -> EngineResult<Self> {
        let keys = KeyPacker::new(batch, group_by, NullPolicy::GroupTogether)?;
        let mut inputs = Vec::with_capacity(aggregates.len());
        let mut value_keys = Vec::with_capacity(aggregates.len());
        for agg in aggregates {
            let column = batch.column(&agg.column)?;
            agg.reduction.output_type(column.data_type())?;
            inputs.push(column);
            value_keys.push(KeyPacker::from_columns(
                vec![column],
                NullPolicy::GroupTogether,
            ));
        }
        Ok(Self {
            keys,
            inputs,
            value_keys,
            aggregates,
        })
    }

    fn empty_partial(&self) -> EngineResult<Partial> {
        let accumulators = self
            .aggregates
            .iter()
            .zip(&self.inputs)
            .map(|(agg, input)| Accumulator::new(agg.reduction, input.data_type()))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Partial {
            groups: KeyedTable::new(),
            accumulators,
        })
    }

    fn build(&self, rows: std::ops::Range<usize>) -> EngineResult<Partial> {
        let mut partial = self.empty_partial()?;
        let mut key = Vec::new();
        let mut scratch = Vec::new();
        for row in rows {
            self.keys.pack(row, &mut key);
            let (group, inserted) = partial.groups.entry(&key, || row)?;
            if inserted {
                for acc in &mut partial.accumulators {
                    acc.resize(group + 1);
                }
            }
            for (i, acc) in partial.accumulators.iter_mut().enumerate() {
                acc.update(group, self.inputs[i], &self.value_keys[i], row, &mut scratch)?;
            }
        }
        Ok(partial)
    }
}

/// Grouped aggregation over one batch
pub struct Aggregator;

impl Aggregator {
    /// Single-threaded aggregation
    pub fn aggregate<S: AsRef<str>>(
        batch: &Batch,
        group_by: &[S],
        aggregates: &[AggregateExpr],
    ) -> EngineResult<Batch> {
        Self::aggregate_with(batch, group_by, aggregates, Parallelism::serial())
    }

    /// Aggregation with one partial table per morsel.
    ///
    /// Output columns are the group-by columns (views over each group's
    /// first row) followed by one column per aggregate named
    /// `{column}_{reduction}`. Groups appear in order of first occurrence.
    /// Without group-by columns exactly one row is produced.
    pub fn aggregate_with<S: AsRef<str>>(
        batch: &Batch,
        group_by: &[S],
        aggregates: &[AggregateExpr],
        parallelism: Parallelism,
    ) -> EngineResult<Batch> {
        let plan = Plan::new(batch, group_by, aggregates)?;

        let partials = parallelism.map_morsels(batch.row_count(), |rows| plan.build(rows));
        let mut merged: Option<Partial> = None;
        for partial in partials {
            let partial = partial?;
            merged = Some(match merged {
                None => partial,
                Some(mut acc) => {
                    let Partial {
                        groups,
                        accumulators,
                    } = partial;
                    let mapping = acc.groups.merge(groups)?;
                    let total = acc.groups.len();
                    for (mine, theirs) in acc.accumulators.iter_mut().zip(accumulators) {
                        mine.merge(theirs, &mapping, total)?;
                    }
                    acc
                }
            });
        }
        let mut merged = match merged {
            Some(partial) => partial,
            None => plan.empty_partial()?,
        };

        if group_by.is_empty() && merged.groups.is_empty() {
            merged.groups.entry(&[], || 0)?;
            for acc in &mut merged.accumulators {
                acc.resize(1);
            }
        }

        let Partial {
            groups,
            accumulators,
        } = merged;
        let first_rows = groups.into_values();
        let group_count = first_rows.len();

        let mut columns = Vec::with_capacity(group_by.len() + aggregates.len());
        for (name, column) in group_by.iter().zip(plan.keys.columns()) {
            columns.push((name.as_ref().to_string(), column.take(&first_rows)));
        }
        for (agg, acc) in aggregates.iter().zip(accumulators) {
            let name = agg.output_name();
            let buffer = acc.finish(&name)?;
            columns.push((name, Column::new(buffer)));
        }
        Batch::with_row_count(columns, group_count)
    }
}
