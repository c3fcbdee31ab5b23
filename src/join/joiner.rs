//! Inner equi-join
//!
//! Build: the hashed side's rows are chained per packed key in row order
//! (`head`/`tail` in the table, `next` links beside it). Rows with a null
//! key component are never inserted.
//!
//! Probe: the streamed side is cut into morsels; each morsel records, for
//! every row with a hit, the chain it matched. The chain lengths give the
//! exact output size before any pair is materialized, which is where the
//! cardinality limit is enforced.
//!
//! Sort-merge: both sides are sorted on their packed keys and runs of equal
//! keys are paired off. The run sizes give the output size up front in the
//! same way.
//!
//! Output order is fixed by the arguments, not by strategy or hashed side:
//! probe-argument rows in input order, and for each of them the matching
//! build-argument rows in input order.

use serde::{Deserialize, Serialize};

use crate::column::{Batch, Column};
use crate::error::{EngineError, EngineResult};
use crate::hash::{check_key_compatible, KeyPacker, KeyedTable, NullPolicy};
use crate::parallel::Parallelism;

const NO_ROW: usize = usize::MAX;

/// Suffix for probe columns whose name is already taken
pub const RIGHT_SUFFIX: &str = "_right";

/// One equality condition: `build.{build} == probe.{probe}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKey {
    pub build: String,
    pub probe: String,
}

impl JoinKey {
    pub fn new(build: impl Into<String>, probe: impl Into<String>) -> Self {
        Self {
            build: build.into(),
            probe: probe.into(),
        }
    }
}

/// Which argument the hash table is built over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSide {
    /// The argument with fewer rows; ties go to the build argument
    #[default]
    Smaller,
    /// Always the build argument
    First,
}

/// How matching rows are found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Hash one input, probe with the other
    #[default]
    Hash,
    /// Sort both inputs on the packed key and merge equal runs
    SortMerge,
}

/// Reaction to a join exceeding its cardinality limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardinalityPolicy {
    /// Produce the output and report the excess in `JoinStats`
    #[default]
    Warn,
    /// Fail with `CardinalityExplosion` before materializing the output
    Abort,
}

/// Join tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinOptions {
    pub strategy: JoinStrategy,
    /// Only consulted by `JoinStrategy::Hash`
    pub build_side: BuildSide,
    pub cardinality_limit: Option<usize>,
    pub cardinality_policy: CardinalityPolicy,
    pub parallelism: Parallelism,
}

/// The argument that ended up hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashedSide {
    Build,
    Probe,
}

/// Facts about one join execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStats {
    pub strategy: JoinStrategy,
    /// Always `Build` for a sort-merge join
    pub hashed: HashedSide,
    pub distinct_keys: usize,
    pub output_rows: usize,
    /// True when the output exceeded the limit under `CardinalityPolicy::Warn`
    pub limit_exceeded: bool,
}

#[derive(Debug, Clone, Copy)]
struct Chain {
    head: usize,
    tail: usize,
    len: usize,
}

/// Hash table over one join input
struct BuildTable {
    chains: KeyedTable<Chain>,
    next: Vec<usize>,
}

impl BuildTable {
    fn build(keys: &KeyPacker<'_>, rows: usize) -> EngineResult<Self> {
        let mut chains: KeyedTable<Chain> = KeyedTable::new();
        let mut next = vec![NO_ROW; rows];
        let mut buf = Vec::new();
        for row in 0..rows {
            if !keys.pack(row, &mut buf) {
                continue;
            }
            let (id, inserted) = chains.entry(&buf, || Chain {
                head: row,
                tail: row,
                len: 1,
            })?;
            if !inserted {
                let chain = chains.value_mut(id);
                next[chain.tail] = row;
                chain.tail = row;
                chain.len += 1;
            }
        }
        Ok(Self { chains, next })
    }

    /// Rows of chain `id` in insertion order
    fn rows(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        let mut row = self.chains.value(id).head;
        std::iter::from_fn(move || {
            if row == NO_ROW {
                return None;
            }
            let current = row;
            row = self.next[current];
            Some(current)
        })
    }
}

fn resolve_keys<'a>(
    batch: &'a Batch,
    names: impl Iterator<Item = &'a str>,
) -> EngineResult<KeyPacker<'a>> {
    let columns = names
        .map(|name| batch.column(name))
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(KeyPacker::from_columns(columns, NullPolicy::NeverMatch))
}

/// Inner equi-join of two batches
pub struct Joiner;

impl Joiner {
    /// Single-threaded join with default options
    pub fn join(build: &Batch, probe: &Batch, keys: &[JoinKey]) -> EngineResult<Batch> {
        Self::join_with(build, probe, keys, &JoinOptions::default()).map(|(batch, _)| batch)
    }

    /// Joins `build` with `probe` on every key pair.
    ///
    /// The output holds all build columns followed by the probe columns that
    /// are not join keys. A probe column whose name is taken gets the
    /// `_right` suffix.
    pub fn join_with(
        build: &Batch,
        probe: &Batch,
        keys: &[JoinKey],
        options: &JoinOptions,
    ) -> EngineResult<(Batch, JoinStats)> {
        if keys.is_empty() {
            return Err(EngineError::InvalidPipeline(
                "join requires at least one key pair".to_string(),
            ));
        }
        let build_keys = resolve_keys(build, keys.iter().map(|k| k.build.as_str()))?;
        let probe_keys = resolve_keys(probe, keys.iter().map(|k| k.probe.as_str()))?;
        for (key, (b, p)) in keys
            .iter()
            .zip(build_keys.columns().iter().zip(probe_keys.columns()))
        {
            check_key_compatible(&key.build, b.data_type(), &key.probe, p.data_type())?;
        }

        let matched = match options.strategy {
            JoinStrategy::Hash => hash_match(
                &build_keys,
                build.row_count(),
                &probe_keys,
                probe.row_count(),
                options,
            )?,
            JoinStrategy::SortMerge => merge_match(
                &build_keys,
                build.row_count(),
                &probe_keys,
                probe.row_count(),
                options,
            )?,
        };

        let batch = Self::assemble(
            build,
            probe,
            keys,
            &matched.build_rows,
            &matched.probe_rows,
        )?;
        let stats = JoinStats {
            strategy: options.strategy,
            hashed: matched.hashed,
            distinct_keys: matched.distinct_keys,
            output_rows: matched.build_rows.len(),
            limit_exceeded: matched.limit_exceeded,
        };
        Ok((batch, stats))
    }

    fn assemble(
        build: &Batch,
        probe: &Batch,
        keys: &[JoinKey],
        build_rows: &[usize],
        probe_rows: &[usize],
    ) -> EngineResult<Batch> {
        let mut columns: Vec<(String, Column)> =
            Vec::with_capacity(build.num_columns() + probe.num_columns());
        for (field, column) in build.fields().iter().zip(build.columns()) {
            columns.push((field.name.clone(), column.take(build_rows)));
        }
        for (field, column) in probe.fields().iter().zip(probe.columns()) {
            if keys.iter().any(|k| k.probe == field.name) {
                continue;
            }
            let taken = columns.iter().any(|(name, _)| *name == field.name);
            let name = if taken {
                format!("{}{}", field.name, RIGHT_SUFFIX)
            } else {
                field.name.clone()
            };
            columns.push((name, column.take(probe_rows)));
        }
        Batch::from_columns(columns)
    }
}

/// Matching row pairs in output order, plus what the strategy learned
struct Matched {
    build_rows: Vec<usize>,
    probe_rows: Vec<usize>,
    hashed: HashedSide,
    distinct_keys: usize,
    limit_exceeded: bool,
}

/// Applies the cardinality limit to a known output size.
///
/// Returns whether the limit was exceeded under `Warn`.
fn check_cardinality(output_rows: usize, options: &JoinOptions) -> EngineResult<bool> {
    match options.cardinality_limit {
        Some(limit) if output_rows > limit => match options.cardinality_policy {
            CardinalityPolicy::Abort => Err(EngineError::CardinalityExplosion {
                produced: output_rows,
                limit,
            }),
            CardinalityPolicy::Warn => Ok(true),
        },
        _ => Ok(false),
    }
}

fn hash_match(
    build_keys: &KeyPacker<'_>,
    build_count: usize,
    probe_keys: &KeyPacker<'_>,
    probe_count: usize,
    options: &JoinOptions,
) -> EngineResult<Matched> {
    let hashed = match options.build_side {
        BuildSide::First => HashedSide::Build,
        BuildSide::Smaller if probe_count < build_count => HashedSide::Probe,
        BuildSide::Smaller => HashedSide::Build,
    };
    let (hashed_keys, hashed_rows, streamed_keys, streamed_rows) = match hashed {
        HashedSide::Build => (build_keys, build_count, probe_keys, probe_count),
        HashedSide::Probe => (probe_keys, probe_count, build_keys, build_count),
    };

    let table = BuildTable::build(hashed_keys, hashed_rows)?;

    let hits: Vec<Vec<(usize, usize)>> = options.parallelism.map_morsels(streamed_rows, |rows| {
        let mut buf = Vec::new();
        let mut out = Vec::new();
        for row in rows {
            if !streamed_keys.pack(row, &mut buf) {
                continue;
            }
            if let Some(id) = table.chains.find(&buf) {
                out.push((row, id));
            }
        }
        out
    });

    let output_rows: usize = hits
        .iter()
        .flatten()
        .map(|(_, id)| table.chains.value(*id).len)
        .sum();
    let limit_exceeded = check_cardinality(output_rows, options)?;

    let mut build_rows = Vec::new();
    let mut probe_rows = Vec::new();
    reserve(&mut build_rows, output_rows)?;
    reserve(&mut probe_rows, output_rows)?;
    match hashed {
        HashedSide::Build => {
            for &(probe_row, id) in hits.iter().flatten() {
                for build_row in table.rows(id) {
                    probe_rows.push(probe_row);
                    build_rows.push(build_row);
                }
            }
        }
        HashedSide::Probe => {
            let mut pairs: Vec<(usize, usize)> = Vec::new();
            reserve(&mut pairs, output_rows)?;
            for &(build_row, id) in hits.iter().flatten() {
                for probe_row in table.rows(id) {
                    pairs.push((probe_row, build_row));
                }
            }
            // Build rows already ascend within each probe row; a stable
            // sort on the probe row restores probe-major order.
            sort_pairs(&mut pairs, options.parallelism);
            for (probe_row, build_row) in pairs {
                probe_rows.push(probe_row);
                build_rows.push(build_row);
            }
        }
    }

    Ok(Matched {
        build_rows,
        probe_rows,
        hashed,
        distinct_keys: table.chains.len(),
        limit_exceeded,
    })
}

/// Packed keys of every non-null row, ordered by key bytes then row
fn sorted_keys(
    keys: &KeyPacker<'_>,
    rows: usize,
    parallelism: Parallelism,
) -> Vec<(Vec<u8>, usize)> {
    let mut packed: Vec<(Vec<u8>, usize)> = parallelism
        .map_morsels(rows, |range| {
            let mut buf = Vec::new();
            range
                .filter_map(|row| keys.pack(row, &mut buf).then(|| (buf.clone(), row)))
                .collect::<Vec<_>>()
        })
        .into_iter()
        .flatten()
        .collect();
    // Rows are already ascending, so a stable sort on the key keeps
    // equal keys in row order.
    if parallelism.enabled {
        use rayon::slice::ParallelSliceMut;
        packed.par_sort_by(|a, b| a.0.cmp(&b.0));
    } else {
        packed.sort_by(|a, b| a.0.cmp(&b.0));
    }
    packed
}

/// Length of the run of equal keys starting at `start`
fn run_len(sorted: &[(Vec<u8>, usize)], start: usize) -> usize {
    sorted[start..]
        .iter()
        .take_while(|(key, _)| *key == sorted[start].0)
        .count()
}

/// Sort-merge match over both inputs.
///
/// Packed key bytes give a total order in which equal keys are adjacent;
/// that order only serves to line up runs and says nothing about the
/// values' natural order.
fn merge_match(
    build_keys: &KeyPacker<'_>,
    build_count: usize,
    probe_keys: &KeyPacker<'_>,
    probe_count: usize,
    options: &JoinOptions,
) -> EngineResult<Matched> {
    let build_sorted = sorted_keys(build_keys, build_count, options.parallelism);
    let probe_sorted = sorted_keys(probe_keys, probe_count, options.parallelism);

    let mut runs: Vec<(std::ops::Range<usize>, std::ops::Range<usize>)> = Vec::new();
    let mut distinct_keys = 0;
    let (mut b, mut p) = (0, 0);
    while b < build_sorted.len() && p < probe_sorted.len() {
        match build_sorted[b].0.cmp(&probe_sorted[p].0) {
            std::cmp::Ordering::Less => {
                b += run_len(&build_sorted, b);
                distinct_keys += 1;
            }
            std::cmp::Ordering::Greater => p += run_len(&probe_sorted, p),
            std::cmp::Ordering::Equal => {
                let b_len = run_len(&build_sorted, b);
                let p_len = run_len(&probe_sorted, p);
                runs.push((b..b + b_len, p..p + p_len));
                b += b_len;
                p += p_len;
                distinct_keys += 1;
            }
        }
    }
    while b < build_sorted.len() {
        b += run_len(&build_sorted, b);
        distinct_keys += 1;
    }

    let output_rows: usize = runs.iter().map(|(b, p)| b.len() * p.len()).sum();
    let limit_exceeded = check_cardinality(output_rows, options)?;

    let mut pairs: Vec<(usize, usize)> = Vec::new();
    reserve(&mut pairs, output_rows)?;
    for (build_run, probe_run) in runs {
        for (_, probe_row) in &probe_sorted[probe_run] {
            for (_, build_row) in &build_sorted[build_run.clone()] {
                pairs.push((*probe_row, *build_row));
            }
        }
    }
    // Every probe row sits in one run, with its build rows ascending.
    sort_pairs(&mut pairs, options.parallelism);

    let mut build_rows = Vec::new();
    let mut probe_rows = Vec::new();
    reserve(&mut build_rows, output_rows)?;
    reserve(&mut probe_rows, output_rows)?;
    for (probe_row, build_row) in pairs {
        probe_rows.push(probe_row);
        build_rows.push(build_row);
    }

    Ok(Matched {
        build_rows,
        probe_rows,
        hashed: HashedSide::Build,
        distinct_keys,
        limit_exceeded,
    })
}

/// Stable sort of `(probe row, build row)` pairs on the probe row
fn sort_pairs(pairs: &mut [(usize, usize)], parallelism: Parallelism) {
    if parallelism.enabled {
        use rayon::slice::ParallelSliceMut;
        pairs.par_sort_by_key(|&(probe_row, _)| probe_row);
    } else {
        pairs.sort_by_key(|&(probe_row, _)| probe_row);
    }
}

fn reserve<T>(v: &mut Vec<T>, additional: usize) -> EngineResult<()> {
    v.try_reserve_exact(additional)
        .map_err(|e| EngineError::AllocationFailure(e.to_string()))
}
