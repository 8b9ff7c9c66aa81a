//! The stream processor against a brute-force recomputation of every
//! target's windowed degree.

use pa_common::EventKind;
use pa_core::input::{EdgeInput, NodeIndex};
use pa_core::sink::CollectingSink;
use pa_core::stream::{EdgeStreamProcessor, ProcessorOptions};
use pa_heap::EdgeStore;
use pa_tree::{build_index, Allocator, TreeVariant};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Last timestamp per distinct (source, target) pair seen so far.
#[derive(Default)]
struct Oracle {
    last: BTreeMap<(u32, u32), u32>,
    sources: BTreeSet<u32>,
}

impl Oracle {
    fn is_active(ts: u32, now: u32, window: u32) -> bool {
        window == 0 || ts >= now.saturating_sub(window)
    }

    fn degrees(&self, now: u32, window: u32) -> BTreeMap<u32, u32> {
        let mut out = BTreeMap::new();
        for (&(_, t), &ts) in &self.last {
            if Self::is_active(ts, now, window) {
                *out.entry(t).or_insert(0) += 1;
            }
        }
        out
    }

    fn expected_kind(&self, s: u32, t: u32, now: u32, window: u32) -> EventKind {
        match self.last.get(&(s, t)) {
            Some(&ts) if Self::is_active(ts, now, window) => EventKind::RefreshActiveEdge,
            Some(_) => EventKind::ReactivatedEdge,
            None if self.sources.contains(&s) => EventKind::NewEdge,
            None => EventKind::NewNodeEdge,
        }
    }

    fn apply(&mut self, s: u32, t: u32, ts: u32) {
        self.last.insert((s, t), ts);
        self.sources.insert(s);
    }
}

fn edge_stream() -> impl Strategy<Value = Vec<(u32, u32, u32)>> {
    prop::collection::vec((0u32..6, 0u32..6, 0u32..8), 1..120).prop_map(|steps| {
        let mut ts = 0;
        steps
            .into_iter()
            .map(|(s, t, dt)| {
                ts += dt;
                (s, t, ts)
            })
            .collect()
    })
}

fn variant() -> impl Strategy<Value = TreeVariant> {
    prop_oneof![Just(TreeVariant::Multiset), Just(TreeVariant::Map)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn classification_and_unweighted_rank_match_brute_force(
        edges in edge_stream(),
        window in prop_oneof![Just(0u32), 1u32..40],
        variant in variant(),
    ) {
        let options = ProcessorOptions {
            window,
            heap_chunk: 4,
            ..ProcessorOptions::default()
        };
        let ranks = build_index::<u32>(variant, Allocator::Compact, &[]);
        let mut p = EdgeStreamProcessor::new(options, NodeIndex::dynamic(), EdgeStore::new(), Some(ranks))
            .unwrap();
        let mut oracle = Oracle::default();

        for (i, &(s, t, ts)) in edges.iter().enumerate() {
            let mut sink = CollectingSink::new();
            let input = EdgeInput { source: s, target: t, timestamp: ts, record: i as u64 + 1 };
            p.process(&input, &mut sink).unwrap();
            p.check().unwrap();

            if s == t {
                prop_assert!(sink.events.is_empty());
                continue;
            }
            let degrees = oracle.degrees(ts, window);
            let d = degrees.get(&t).copied().unwrap_or(0);
            prop_assert_eq!(sink.events.len(), 1);
            let (event, rank) = &sink.events[0];
            prop_assert_eq!(event.kind, oracle.expected_kind(s, t, ts, window));
            prop_assert_eq!(event.degree, d);
            prop_assert_eq!(event.timestamp, ts);

            let rank = rank.as_ref().unwrap();
            let positive: Vec<u32> = degrees.values().copied().filter(|&x| x > 0).collect();
            let below = if d == 0 { 0 } else { positive.iter().filter(|&&x| x <= d).count() };
            prop_assert_eq!(rank.count, below as u64);
            prop_assert_eq!(rank.norm_count, positive.len() as u64);

            oracle.apply(s, t, ts);
            let after = oracle.degrees(ts, window);
            for (&node, &deg) in &after {
                prop_assert_eq!(p.degree(node), Some(deg));
            }
        }

        let self_loops = edges.iter().filter(|(s, t, _)| s == t).count() as u64;
        prop_assert_eq!(p.stats().self_loops, self_loops);
        prop_assert_eq!(p.stats().classified(), edges.len() as u64 - self_loops);
    }

    #[test]
    fn weighted_ranks_are_normalised(
        edges in edge_stream(),
        window in 1u32..30,
    ) {
        let options = ProcessorOptions { window, ..ProcessorOptions::default() };
        let ranks = build_index::<u32>(TreeVariant::Map, Allocator::Boxed, &[0.0, 1.0, 2.5]);
        let mut p = EdgeStreamProcessor::new(options, NodeIndex::dynamic(), EdgeStore::new(), Some(ranks))
            .unwrap();
        let mut sink = CollectingSink::new();
        for (i, &(s, t, ts)) in edges.iter().enumerate() {
            let input = EdgeInput { source: s, target: t, timestamp: ts, record: i as u64 + 1 };
            p.process(&input, &mut sink).unwrap();
        }
        p.check().unwrap();
        for (event, rank) in &sink.events {
            let rank = rank.as_ref().unwrap();
            prop_assert_eq!(rank.weighted.len(), 3);
            for &r in &rank.weighted {
                prop_assert!((0.0..=1.0).contains(&r), "rank {} outside [0, 1]", r);
            }
            if event.degree == 0 {
                prop_assert!(rank.weighted.iter().all(|&r| r == 0.0));
            } else {
                prop_assert!(rank.weighted.iter().all(|&r| r > 0.0));
            }
        }
    }
}
