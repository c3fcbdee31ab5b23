//! Aggregation and Join Tests
//!
//! Tests for operator invariants:
//! - Global reductions equal manually computed totals
//! - count_distinct matches a known duplicate structure
//! - Inner join cardinality and probe-row order
//! - Null keys group together but never join
//! - Parallel aggregation and join equal the serial result

use std::collections::HashSet;

use colexec::aggregate::{AggregateExpr, Aggregator};
use colexec::column::{Batch, ColumnBuffer, ScalarValue};
use colexec::join::{BuildSide, JoinKey, JoinOptions, JoinStrategy, Joiner};
use colexec::parallel::Parallelism;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =============================================================================
// Helper Functions
// =============================================================================

fn random_facts(rng: &mut StdRng, rows: usize) -> Batch {
    let keys: Vec<Option<i32>> = (0..rows)
        .map(|_| (rng.gen_ratio(19, 20)).then(|| rng.gen_range(0..50)))
        .collect();
    let tags: Vec<String> = (0..rows).map(|_| format!("t{}", rng.gen_range(0..3))).collect();
    let qty: Vec<i64> = (0..rows).map(|_| rng.gen_range(1..100)).collect();
    let price: Vec<Option<f64>> = (0..rows)
        .map(|_| (rng.gen_ratio(9, 10)).then(|| rng.gen_range(0..10_000) as f64 / 100.0))
        .collect();
    Batch::try_new(vec![
        ("key", ColumnBuffer::from_opt_i32(keys)),
        ("tag", ColumnBuffer::from_strs(tags)),
        ("qty", ColumnBuffer::from_i64(qty)),
        ("price", ColumnBuffer::from_opt_f64(price)),
    ])
    .unwrap()
}

fn all_reductions() -> Vec<AggregateExpr> {
    vec![
        AggregateExpr::sum("qty"),
        AggregateExpr::mean("qty"),
        AggregateExpr::sum("price"),
        AggregateExpr::mean("price"),
        AggregateExpr::count("price"),
        AggregateExpr::count_distinct("tag"),
    ]
}

// =============================================================================
// Global Aggregate Tests
// =============================================================================

/// sum, mean and count over one group equal hand-computed totals.
#[test]
fn test_global_reductions_match_manual_totals() {
    let mut rng = StdRng::seed_from_u64(2024);
    let batch = random_facts(&mut rng, 1000);

    let qty = batch.column("qty").unwrap();
    let expected_sum: i64 = (0..batch.row_count()).filter_map(|r| qty.i64_at(r)).sum();
    let expected_mean = expected_sum as f64 / batch.row_count() as f64;

    let out = Aggregator::aggregate::<&str>(
        &batch,
        &[],
        &[
            AggregateExpr::sum("qty"),
            AggregateExpr::mean("qty"),
            AggregateExpr::count("qty"),
        ],
    )
    .unwrap();
    assert_eq!(out.row_count(), 1);
    assert_eq!(out.column_names(), vec!["qty_sum", "qty_mean", "qty_count"]);
    assert_eq!(out.row(0)[0], ScalarValue::Int64(expected_sum));
    match out.row(0)[1] {
        ScalarValue::Float64(mean) => assert!((mean - expected_mean).abs() < 1e-9),
        ref other => panic!("unexpected mean {:?}", other),
    }
    assert_eq!(out.row(0)[2], ScalarValue::Int64(1000));
}

/// count_distinct over a column with a known duplicate structure.
#[test]
fn test_count_distinct_known_structure() {
    // 0..10 repeated 7 times, plus two nulls
    let mut values: Vec<Option<i64>> = (0..70).map(|i| Some(i % 10)).collect();
    values.push(None);
    values.push(None);
    let batch = Batch::try_new(vec![("v", ColumnBuffer::from_opt_i64(values))]).unwrap();

    let out = Aggregator::aggregate::<&str>(
        &batch,
        &[],
        &[AggregateExpr::count_distinct("v"), AggregateExpr::count("v")],
    )
    .unwrap();
    assert_eq!(out.row(0), vec![ScalarValue::Int64(10), ScalarValue::Int64(70)]);
}

/// Per-group results agree with a reference computed row by row.
#[test]
fn test_grouped_sum_matches_reference() {
    let mut rng = StdRng::seed_from_u64(5);
    let batch = random_facts(&mut rng, 2000);
    let out = Aggregator::aggregate(&batch, &["tag"], &all_reductions()).unwrap();

    let tags = batch.column("tag").unwrap();
    let qty = batch.column("qty").unwrap();
    for row in 0..out.row_count() {
        let tag = out.column("tag").unwrap().str_at(row).unwrap().to_string();
        let expected: i64 = (0..batch.row_count())
            .filter(|r| tags.str_at(*r) == Some(tag.as_str()))
            .filter_map(|r| qty.i64_at(r))
            .sum();
        assert_eq!(out.column("qty_sum").unwrap().i64_at(row), Some(expected));
        assert_eq!(
            out.column("tag_count_distinct").unwrap().i64_at(row),
            Some(1)
        );
    }
}

/// Groups are emitted in order of first occurrence.
#[test]
fn test_groups_in_first_occurrence_order() {
    let batch = Batch::try_new(vec![
        ("k", ColumnBuffer::from_strs(["c", "a", "c", "b", "a"])),
        ("v", ColumnBuffer::from_i32(vec![1, 2, 3, 4, 5])),
    ])
    .unwrap();
    let out = Aggregator::aggregate(&batch, &["k"], &[AggregateExpr::sum("v")]).unwrap();
    let keys: Vec<&str> = (0..3)
        .map(|r| out.column("k").unwrap().str_at(r).unwrap())
        .collect();
    assert_eq!(keys, vec!["c", "a", "b"]);
}

// =============================================================================
// Join Tests
// =============================================================================

/// Build {1,2,3} against probe {1,1,2,4} yields 3 rows in probe order.
#[test]
fn test_join_cardinality_and_order() {
    let build = Batch::try_new(vec![
        ("id", ColumnBuffer::from_i64(vec![1, 2, 3])),
        ("label", ColumnBuffer::from_strs(["one", "two", "three"])),
    ])
    .unwrap();
    let probe = Batch::try_new(vec![
        ("id", ColumnBuffer::from_i64(vec![1, 1, 2, 4])),
        ("seq", ColumnBuffer::from_i64(vec![0, 1, 2, 3])),
    ])
    .unwrap();

    let out = Joiner::join(&build, &probe, &[JoinKey::new("id", "id")]).unwrap();
    assert_eq!(out.row_count(), 3);
    assert_eq!(out.column_names(), vec!["id", "label", "seq"]);
    let seq: Vec<Option<i64>> = (0..3).map(|r| out.column("seq").unwrap().i64_at(r)).collect();
    assert_eq!(seq, vec![Some(0), Some(1), Some(2)]);
    let ids: Vec<Option<i64>> = (0..3).map(|r| out.column("id").unwrap().i64_at(r)).collect();
    assert_eq!(ids, vec![Some(1), Some(1), Some(2)]);
}

/// Two null keys on each side produce no matches, while grouping puts them together.
#[test]
fn test_null_key_asymmetry() {
    let left = Batch::try_new(vec![
        ("k", ColumnBuffer::from_opt_i64(vec![None, None])),
        ("a", ColumnBuffer::from_i64(vec![1, 2])),
    ])
    .unwrap();
    let right = Batch::try_new(vec![
        ("k", ColumnBuffer::from_opt_i64(vec![None, None])),
        ("b", ColumnBuffer::from_i64(vec![3, 4])),
    ])
    .unwrap();

    let joined = Joiner::join(&left, &right, &[JoinKey::new("k", "k")]).unwrap();
    assert_eq!(joined.row_count(), 0);
    assert_eq!(joined.column_names(), vec!["k", "a", "b"]);

    let grouped = Aggregator::aggregate(&left, &["k"], &[AggregateExpr::sum("a")]).unwrap();
    assert_eq!(grouped.row_count(), 1);
    assert_eq!(grouped.row(0), vec![ScalarValue::Null, ScalarValue::Int64(3)]);
}

/// Integer keys of different widths join on value.
#[test]
fn test_mixed_width_integer_keys() {
    let left = Batch::try_new(vec![("k", ColumnBuffer::from_i32(vec![7, 8]))]).unwrap();
    let right = Batch::try_new(vec![("k", ColumnBuffer::from_u32(vec![8, 9, 7]))]).unwrap();
    let out = Joiner::join(&left, &right, &[JoinKey::new("k", "k")]).unwrap();
    assert_eq!(out.row_count(), 2);
    assert_eq!(out.row(0)[0], ScalarValue::Int32(8));
    assert_eq!(out.row(1)[0], ScalarValue::Int32(7));
}

// =============================================================================
// Serial vs Parallel Tests
// =============================================================================

/// Aggregation output is identical for every morsel size.
#[test]
fn test_parallel_aggregate_identical() {
    let mut rng = StdRng::seed_from_u64(77);
    let batch = random_facts(&mut rng, 10_000);
    let serial = Aggregator::aggregate(&batch, &["key", "tag"], &all_reductions()).unwrap();
    for morsel in [1, 100, 333, 4096] {
        let parallel = Aggregator::aggregate_with(
            &batch,
            &["key", "tag"],
            &all_reductions(),
            Parallelism::parallel(morsel),
        )
        .unwrap();
        assert_eq!(serial, parallel, "morsel size {}", morsel);
    }
}

/// Join output is identical for every morsel size, build side and strategy.
#[test]
fn test_parallel_join_identical() {
    let mut rng = StdRng::seed_from_u64(78);
    let facts = random_facts(&mut rng, 5_000);
    let dims = Batch::try_new(vec![
        ("id", ColumnBuffer::from_i32((0..40).collect())),
        (
            "region",
            ColumnBuffer::from_strs((0..40).map(|i| format!("r{}", i % 5))),
        ),
    ])
    .unwrap();
    let keys = [JoinKey::new("id", "key")];

    let serial = Joiner::join(&dims, &facts, &keys).unwrap();
    let distinct: HashSet<Option<i64>> = (0..serial.row_count())
        .map(|r| serial.column("id").unwrap().i64_at(r))
        .collect();
    assert!(distinct.len() <= 40);

    for (morsel, build_side, strategy) in [
        (1, BuildSide::Smaller, JoinStrategy::Hash),
        (97, BuildSide::First, JoinStrategy::Hash),
        (1024, BuildSide::Smaller, JoinStrategy::Hash),
        (1, BuildSide::Smaller, JoinStrategy::SortMerge),
        (500, BuildSide::Smaller, JoinStrategy::SortMerge),
    ] {
        let options = JoinOptions {
            strategy,
            build_side,
            parallelism: Parallelism::parallel(morsel),
            ..JoinOptions::default()
        };
        let (parallel, stats) = Joiner::join_with(&dims, &facts, &keys, &options).unwrap();
        assert_eq!(serial, parallel);
        assert_eq!(stats.output_rows, serial.row_count());
    }
}

/// Sort-merge join agrees with hash join on random many-to-many inputs.
#[test]
fn test_sort_merge_equals_hash_join() {
    let mut rng = StdRng::seed_from_u64(79);
    for _ in 0..10 {
        let left = random_facts(&mut rng, 300);
        let right = random_facts(&mut rng, 200);
        let keys = [JoinKey::new("key", "key"), JoinKey::new("tag", "tag")];
        let hash = Joiner::join(&left, &right, &keys).unwrap();
        let options = JoinOptions {
            strategy: JoinStrategy::SortMerge,
            ..JoinOptions::default()
        };
        let (merged, stats) = Joiner::join_with(&left, &right, &keys, &options).unwrap();
        assert_eq!(hash, merged);
        assert_eq!(stats.output_rows, hash.row_count());
    }
}
