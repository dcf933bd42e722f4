//! Property-based tests for benchmark-store
//!
//! - Table row-count law and upsert idempotence
//! - Columnar and row-major materialization agree
//! - Dedup filtering is idempotent
//! - Run with ProptestConfig::with_cases(100)

use benchmark_store::transaction::{interaction_record, learner_record, Transaction};
use benchmark_store::value::{fields, packed, Fields, Packed};
use benchmark_store::{BenchmarkResult, Table, TransactionIsNew, Value};
use proptest::prelude::*;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// A cell value of any storable kind
fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        (-1e6f64..1e6).prop_map(Value::Float),
        any::<bool>().prop_map(Value::Boolean),
        "[a-z]{0,6}".prop_map(Value::Text),
        Just(Value::Null),
    ]
}

/// Flat fields over a small column vocabulary
fn arb_fields() -> impl Strategy<Value = Fields> {
    proptest::collection::vec((prop_oneof!["a", "b", "c"], arb_value()), 0..3)
        .prop_map(fields)
}

/// Packed part with 0-2 equal-length columns
fn arb_packed() -> impl Strategy<Value = Option<Packed>> {
    (0usize..5, 0usize..3).prop_flat_map(|(len, width)| {
        proptest::collection::vec(proptest::collection::vec(arb_value(), len), width).prop_map(
            move |columns| {
                (width > 0).then(|| {
                    packed(
                        columns
                            .into_iter()
                            .enumerate()
                            .map(|(i, values)| (format!("p{i}"), values)),
                    )
                })
            },
        )
    })
}

/// A sequence of upserts against a two-part key space
fn arb_upserts() -> impl Strategy<Value = Vec<((i64, i64), Fields, Option<Packed>)>> {
    proptest::collection::vec(((0i64..4, 0i64..3), arb_fields(), arb_packed()), 0..20)
}

/// A transaction stream mixing learners and interactions
fn arb_transactions() -> impl Strategy<Value = Vec<Transaction>> {
    proptest::collection::vec(
        prop_oneof![
            (0i64..5).prop_map(|id| learner_record(id, Fields::new())),
            (0i64..3, 0i64..3).prop_map(|(s, l)| interaction_record(s, l, Fields::new(), None)),
        ],
        0..30,
    )
}

fn table_from(upserts: &[((i64, i64), Fields, Option<Packed>)]) -> Table {
    let mut table = Table::new("Interactions", &["simulation_id", "learner_id"]);
    for (key, flat, packed) in upserts {
        table.set(*key, flat.clone(), packed.clone()).unwrap();
    }
    table
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: len == sum over keys of (packed length, or 1 when flat)
    #[test]
    fn prop_row_count_law(upserts in arb_upserts()) {
        let table = table_from(&upserts);

        let expected: usize = table
            .keys()
            .map(|key| {
                let row = table.get(key).unwrap();
                match row.get("index").and_then(Value::as_array) {
                    Some(index) => index.len(),
                    None => 1,
                }
            })
            .sum();

        prop_assert_eq!(table.len(), expected);
        prop_assert_eq!(table.materialize_rows().len(), table.len());
    }

    /// Property: applying the same upsert twice equals applying it once
    #[test]
    fn prop_upsert_idempotent(upserts in arb_upserts()) {
        let once = table_from(&upserts);
        let doubled: Vec<_> = upserts.iter().flat_map(|u| [u.clone(), u.clone()]).collect();
        let twice = table_from(&doubled);

        prop_assert_eq!(once.len(), twice.len());
        prop_assert_eq!(once.columns(), twice.columns());
        prop_assert_eq!(once.iter().count(), twice.iter().count());
    }

    /// Property: every columnar buffer has one cell per materialized row
    #[test]
    fn prop_columnar_matches_row_count(upserts in arb_upserts()) {
        let table = table_from(&upserts);
        let columns = table.materialize_columnar();

        prop_assert_eq!(columns.len(), table.columns().len());
        for buffer in columns.values() {
            prop_assert_eq!(buffer.len(), table.len());
        }
    }

    /// Property: after folding a stream, nothing in it is new any more
    #[test]
    fn prop_dedup_idempotent(transactions in arb_transactions()) {
        let result = BenchmarkResult::from_transactions(transactions.clone()).unwrap();
        let remaining = TransactionIsNew::new(&result).filter(transactions).count();
        prop_assert_eq!(remaining, 0);
    }

    /// Property: folding only the new transactions leaves the result unchanged in size
    #[test]
    fn prop_dedup_against_prefix(
        transactions in arb_transactions(),
        split in 0usize..30,
    ) {
        let split = split.min(transactions.len());
        let (head, tail) = transactions.split_at(split);

        let restored = BenchmarkResult::from_transactions(head.to_vec()).unwrap();
        let new: Vec<_> = TransactionIsNew::new(&restored).filter(tail.to_vec()).collect();

        let mut resumed = restored.clone();
        for transaction in new {
            resumed.apply(transaction).unwrap();
        }
        let full = BenchmarkResult::from_transactions(transactions).unwrap();

        prop_assert_eq!(resumed.learners().len(), full.learners().len());
        prop_assert_eq!(resumed.interactions().len(), full.interactions().len());
    }
}
