//! Property-based tests for the aggregate tree.
//!
//! Random mutation sequences are replayed against a `BTreeMap` oracle for both
//! semantics and both node stores. After every step the tree must pass its
//! full invariant check and agree with the oracle on counts and ranks.

use pa_common::RankSample;
use pa_tree::{
    build_index, AggregateTree, Allocator, BoxedStore, CompactStore, NodeStore, RankVector,
    Semantics, TreeVariant, WeightSet,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::BTreeMap;

/// Tolerance for oracle sums, which are accumulated in key order.
const TOL: f64 = 1e-9;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

#[derive(Debug, Clone)]
enum Op {
    Insert(u32),
    Erase(u32),
    SetMultiplicity(u32, u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1u32..40).prop_map(Op::Insert),
        2 => (1u32..40).prop_map(Op::Erase),
        1 => (1u32..40, 0u64..5).prop_map(|(k, n)| Op::SetMultiplicity(k, n)),
    ]
}

fn oracle_prefix(oracle: &BTreeMap<u32, u64>, key: u32) -> u64 {
    oracle.range(..=key).map(|(_, c)| *c).sum()
}

fn oracle_weighted(oracle: &BTreeMap<u32, u64>, key: u32, exponent: f64) -> f64 {
    oracle
        .range(..=key)
        .map(|(k, c)| (*k as f64).powf(exponent) * *c as f64)
        .sum()
}

/// Apply `ops` to a fresh tree and cross-check it after each step.
fn run_against_oracle<S: NodeStore<u32>>(
    semantics: Semantics,
    exponents: &[f64],
    ops: &[Op],
) -> Result<(), TestCaseError> {
    let mut tree: AggregateTree<u32, S> =
        AggregateTree::new(semantics, WeightSet::new(exponents.to_vec()));
    let mut oracle: BTreeMap<u32, u64> = BTreeMap::new();
    let mut rank = RankVector::new(exponents.len());
    let mut norm = RankVector::new(exponents.len());

    for op in ops {
        match *op {
            Op::Insert(k) => {
                tree.insert(k).map_err(|e| TestCaseError::fail(e.to_string()))?;
                *oracle.entry(k).or_default() += 1;
            }
            Op::Erase(k) => {
                let result = tree.erase_key(k);
                match oracle.get_mut(&k) {
                    Some(c) => {
                        prop_assert!(result.is_ok(), "erase of present key {} failed", k);
                        *c -= 1;
                        if *c == 0 {
                            oracle.remove(&k);
                        }
                    }
                    None => {
                        prop_assert!(result.is_err(), "erase of absent key {} succeeded", k);
                    }
                }
            }
            Op::SetMultiplicity(k, n) => {
                if let Some(h) = tree.find(k) {
                    let old = tree.multiplicity(h).map_err(|e| TestCaseError::fail(e.to_string()))?;
                    tree.set_multiplicity(h, n)
                        .map_err(|e| TestCaseError::fail(e.to_string()))?;
                    let c = oracle.entry(k).or_default();
                    *c = *c - old + n;
                    if *c == 0 {
                        oracle.remove(&k);
                    }
                }
            }
        }

        if let Err(msg) = tree.check_invariants() {
            return Err(TestCaseError::fail(format!("after {:?}: {}", op, msg)));
        }

        let total: u64 = oracle.values().sum();
        tree.norm(&mut norm);
        prop_assert_eq!(tree.len(), total);
        prop_assert_eq!(norm.count, total);

        for &k in oracle.keys() {
            tree.rank_of_key(k, &mut rank);
            prop_assert_eq!(rank.count, oracle_prefix(&oracle, k));
            for (slot, &a) in exponents.iter().enumerate() {
                let expected = oracle_weighted(&oracle, k, a);
                prop_assert!(
                    approx_eq(rank.weighted[slot], expected, TOL),
                    "rank of {} for a={} is {} but oracle says {}",
                    k, a, rank.weighted[slot], expected
                );
            }
        }

        if let Some((&max, _)) = oracle.iter().next_back() {
            tree.rank_of_key(max, &mut rank);
            prop_assert_eq!(rank.count, norm.count);
            prop_assert_eq!(&rank.weighted, &norm.weighted);
        } else {
            prop_assert!(norm.weighted.iter().all(|&x| x == 0.0));
        }
    }
    Ok(())
}

// ============================================================================
// Rank equals count under constant weight
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// With exponent 0 every unit weighs exactly 1, so the weighted rank is
    /// the plain count of keys not exceeding the query and must match exactly.
    #[test]
    fn constant_weight_rank_is_count(keys in prop::collection::vec(1u32..1000, 0..300), query in 0u32..1100) {
        let mut tree: AggregateTree<u32> = AggregateTree::new(Semantics::Multiset, WeightSet::new(vec![0.0]));
        for &k in &keys {
            tree.insert(k).unwrap();
        }
        let mut out = tree.rank_vector();
        tree.rank_of_key(query, &mut out);
        let expected = keys.iter().filter(|&&k| k <= query).count();
        prop_assert_eq!(out.count, expected as u64);
        prop_assert_eq!(out.weighted[0], expected as f64);
    }

    /// Norm equals the weighted rank of the largest key, bit for bit.
    #[test]
    fn norm_is_rank_of_max(keys in prop::collection::vec(1u32..100_000, 1..200)) {
        let mut tree: AggregateTree<u32> =
            AggregateTree::new(Semantics::Map, WeightSet::new(vec![0.0, 0.5, 1.0, 2.3]));
        for &k in &keys {
            tree.insert(k).unwrap();
        }
        let max = *keys.iter().max().unwrap();
        let mut rank = tree.rank_vector();
        let mut norm = tree.rank_vector();
        tree.rank_of_key(max, &mut rank);
        tree.norm(&mut norm);
        prop_assert_eq!(rank.count, norm.count);
        prop_assert_eq!(rank.weighted, norm.weighted);
    }
}

// ============================================================================
// Aggregate invariant under random mutation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn multiset_compact_matches_oracle(ops in prop::collection::vec(op_strategy(), 1..200)) {
        run_against_oracle::<CompactStore<u32>>(Semantics::Multiset, &[0.0, 1.0, 1.5], &ops)?;
    }

    #[test]
    fn multiset_boxed_matches_oracle(ops in prop::collection::vec(op_strategy(), 1..200)) {
        run_against_oracle::<BoxedStore<u32>>(Semantics::Multiset, &[0.0, 0.7], &ops)?;
    }

    #[test]
    fn map_compact_matches_oracle(ops in prop::collection::vec(op_strategy(), 1..200)) {
        run_against_oracle::<CompactStore<u32>>(Semantics::Map, &[0.0, 2.0], &ops)?;
    }

    #[test]
    fn map_boxed_matches_oracle(ops in prop::collection::vec(op_strategy(), 1..200)) {
        run_against_oracle::<BoxedStore<u32>>(Semantics::Map, &[], &ops)?;
    }
}

// ============================================================================
// Normalized ranks through the index facade
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Normalized ranks stay inside `[0, 1]` and the largest key ranks
    /// exactly 1, for every variant, allocator and non-integer exponent.
    #[test]
    fn normalized_ranks_stay_in_unit_interval(
        keys in prop::collection::vec(1u32..1000, 1..300),
        map in any::<bool>(),
        boxed in any::<bool>(),
    ) {
        let variant = if map { TreeVariant::Map } else { TreeVariant::Multiset };
        let allocator = if boxed { Allocator::Boxed } else { Allocator::Compact };
        let mut index = build_index::<u32>(variant, allocator, &[0.5, 1.3, 2.7]);
        let mut sample = RankSample::zeroed(3);
        let mut max = 0;
        for &k in &keys {
            index.add(k).map_err(|e| TestCaseError::fail(e.to_string()))?;
            max = max.max(k);
            index.rank(max, &mut sample).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(&sample.weighted, &vec![1.0; 3]);
            index.rank(k, &mut sample).map_err(|e| TestCaseError::fail(e.to_string()))?;
            for &r in &sample.weighted {
                prop_assert!(r > 0.0 && r <= 1.0, "rank {} of key {}", r, k);
            }
        }
    }
}
