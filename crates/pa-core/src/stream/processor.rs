//! Per-edge state machine.
//!
//! For each input edge the processor:
//! 1. expires every tracked edge whose last transaction is older than the
//!    retention window, lowering its target's degree
//! 2. classifies the edge (new, new source, refresh, reactivation)
//! 3. ranks the target's current degree, before touching the distribution
//! 4. activates the edge (new / reactivated) or refreshes its timestamp
//!
//! The degree table, the rank index and the eviction heap are only ever
//! coupled here. Degree 0 is never stored in the rank index.

use super::stats::StreamStats;
use crate::config::AnalysisConfig;
use crate::input::{EdgeInput, NodeIndex};
use crate::sink::EventSink;
use pa_common::{Error, EventKind, EventRecord, Position, RankSample, Result};
use pa_heap::{EdgeStore, EvictionHeap, DEFAULT_CHUNK};
use pa_tree::RankIndex;
use tracing::trace;

/// Knobs the processor reads from the analysis configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Retention window in seconds; 0 never expires.
    pub window: u32,
    pub strict_order: bool,
    pub contracts: bool,
    pub heap_chunk: usize,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        ProcessorOptions {
            window: crate::config::duration::MONTH,
            strict_order: true,
            contracts: false,
            heap_chunk: DEFAULT_CHUNK,
        }
    }
}

impl From<&AnalysisConfig> for ProcessorOptions {
    fn from(cfg: &AnalysisConfig) -> Self {
        ProcessorOptions {
            window: cfg.window.seconds(),
            strict_order: cfg.strict_order,
            contracts: cfg.contracts,
            heap_chunk: cfg.heap_chunk,
        }
    }
}

pub struct EdgeStreamProcessor {
    options: ProcessorOptions,
    nodes: NodeIndex,
    /// Current in-degree per dense node index.
    degrees: Vec<u32>,
    /// Activations per dense source index.
    sent: Vec<u32>,
    edges: EdgeStore,
    /// Absent with an unbounded window: nothing ever expires.
    heap: Option<EvictionHeap>,
    /// Absent in event-log mode.
    ranks: Option<Box<dyn RankIndex<u32>>>,
    sample: RankSample,
    stats: StreamStats,
    last_ts: Option<u32>,
}

fn contract_flag(nodes: &NodeIndex, enabled: bool, index: u32) -> Option<u8> {
    enabled.then(|| u8::from(nodes.is_contract(index)))
}

fn at_record(err: Error, record: u64) -> Error {
    match err {
        Error::InconsistentData(msg) => {
            Error::InconsistentData(format!("{} ({})", msg, Position::new(record)))
        }
        other => other,
    }
}

impl EdgeStreamProcessor {
    /// `edges` is either empty or preloaded from a link table; `ranks` is
    /// `None` when only the event log is wanted.
    pub fn new(
        options: ProcessorOptions,
        nodes: NodeIndex,
        edges: EdgeStore,
        ranks: Option<Box<dyn RankIndex<u32>>>,
    ) -> Result<Self> {
        if options.contracts && !nodes.has_contracts() {
            return Err(Error::Config(
                "contract flags need an ids file with a contract column".to_string(),
            ));
        }
        let heap = (options.window > 0).then(|| EvictionHeap::with_chunk(options.heap_chunk));
        let sample = RankSample::zeroed(ranks.as_ref().map_or(0, |r| r.width()));
        let n = nodes.len();
        Ok(EdgeStreamProcessor {
            options,
            nodes,
            degrees: vec![0; n],
            sent: vec![0; n],
            edges,
            heap,
            ranks,
            sample,
            stats: StreamStats::default(),
            last_ts: None,
        })
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut StreamStats {
        &mut self.stats
    }

    pub fn nodes(&self) -> &NodeIndex {
        &self.nodes
    }

    /// Current degree of an external node id; `None` if never seen.
    pub fn degree(&self, id: u32) -> Option<u32> {
        let index = self.nodes.lookup(id)?;
        Some(self.degrees.get(index as usize).copied().unwrap_or(0))
    }

    /// Edges currently inside the retention window.
    pub fn active_edges(&self) -> usize {
        match &self.heap {
            Some(heap) => heap.len(),
            None => self.edges.iter().filter(|e| e.seen).count(),
        }
    }

    pub fn rank_index(&self) -> Option<&dyn RankIndex<u32>> {
        self.ranks.as_deref()
    }

    /// Full consistency check of the heap and the rank index.
    pub fn check(&self) -> std::result::Result<(), String> {
        if let Some(heap) = &self.heap {
            heap.check_invariants(&self.edges)?;
        }
        if let Some(ranks) = &self.ranks {
            ranks.check()?;
            let positive = self.degrees.iter().filter(|&&d| d > 0).count() as u64;
            if ranks.len() != positive {
                return Err(format!(
                    "rank index holds {} keys but {} nodes have a positive degree",
                    ranks.len(),
                    positive
                ));
            }
        }
        Ok(())
    }

    /// Process one edge, handing its events to `sink`.
    pub fn process(&mut self, edge: &EdgeInput, sink: &mut dyn EventSink) -> Result<()> {
        self.stats.records += 1;
        if edge.source == edge.target {
            self.stats.self_loops += 1;
            return Ok(());
        }

        let ts = edge.timestamp;
        if let Some(prev) = self.last_ts {
            if ts < prev && self.options.strict_order {
                return Err(Error::UnsortedInput {
                    position: Position::new(edge.record),
                    timestamp: ts,
                    previous: prev,
                });
            }
        }
        self.last_ts = Some(self.last_ts.map_or(ts, |prev| prev.max(ts)));

        let src = self.nodes.resolve(edge.source).map_err(|e| at_record(e, edge.record))?;
        let dst = self.nodes.resolve(edge.target).map_err(|e| at_record(e, edge.record))?;
        let needed = src.max(dst) as usize + 1;
        if self.degrees.len() < needed {
            self.degrees.resize(needed, 0);
            self.sent.resize(needed, 0);
        }

        self.expire(ts, sink)?;

        let id = self
            .edges
            .locate_or_insert(src, dst)
            .map_err(|e| at_record(e.into(), edge.record))?;
        let rec = *self.edges.get(id);
        let active = match self.heap {
            Some(_) => rec.is_active(),
            None => rec.seen,
        };
        let has_sent = self.sent[src as usize] > 0;
        let kind = match (rec.seen, active) {
            (false, _) if has_sent => EventKind::NewEdge,
            (false, _) => EventKind::NewNodeEdge,
            (true, true) => EventKind::RefreshActiveEdge,
            (true, false) => EventKind::ReactivatedEdge,
        };
        if rec.seen && !has_sent {
            return Err(Error::InconsistentData(format!(
                "edge {} -> {} was activated before but its source has no activations ({})",
                edge.source,
                edge.target,
                Position::new(edge.record)
            )));
        }
        if kind == EventKind::RefreshActiveEdge && ts < rec.timestamp {
            return Err(Error::UnsortedInput {
                position: Position::new(edge.record),
                timestamp: ts,
                previous: rec.timestamp,
            });
        }

        let d = self.degrees[dst as usize];
        if let Some(index) = self.ranks.as_mut() {
            if d > 0 {
                index.rank(d, &mut self.sample)?;
            } else {
                self.sample.clear();
                self.sample.norm_count = index.len();
            }
            self.stats.rank_queries += 1;
        }

        let flag = self.options.contracts.then(|| {
            u8::from(self.nodes.is_contract(dst)) + 2 * u8::from(self.nodes.is_contract(src))
        });
        let event = EventRecord::new(kind, d, ts).with_contract(flag);
        let rank = self.ranks.is_some().then_some(&self.sample);
        sink.record(&event, rank)?;
        self.stats.bump(kind);
        trace!(source = edge.source, target = edge.target, kind = kind.code(), degree = d, "classified");

        self.edges.get_mut(id).timestamp = ts;
        if kind == EventKind::RefreshActiveEdge {
            if let Some(heap) = self.heap.as_mut() {
                heap.sift_down_for(&mut self.edges, id)?;
            }
            return Ok(());
        }

        self.edges.get_mut(id).seen = true;
        if let Some(heap) = self.heap.as_mut() {
            heap.push(&mut self.edges, id)?;
        }
        let nd = d.checked_add(1).ok_or_else(|| {
            Error::InconsistentData(format!("degree of node {} overflows", edge.target))
        })?;
        self.degrees[dst as usize] = nd;
        if let Some(index) = self.ranks.as_mut() {
            index.replace(d, nd)?;
        }
        let sent = &mut self.sent[src as usize];
        *sent = sent.saturating_add(1);

        self.stats.bump(EventKind::DegreeIncrease);
        if sink.wants_bookkeeping() {
            let flag = contract_flag(&self.nodes, self.options.contracts, dst);
            sink.record(&EventRecord::new(EventKind::DegreeIncrease, nd, ts).with_contract(flag), None)?;
        }
        Ok(())
    }

    /// Drop every edge last seen before `now - window`.
    fn expire(&mut self, now: u32, sink: &mut dyn EventSink) -> Result<()> {
        let Some(heap) = self.heap.as_mut() else {
            return Ok(());
        };
        let horizon = now.saturating_sub(self.options.window);
        while let Some(id) = heap.peek_min() {
            let rec = *self.edges.get(id);
            if rec.timestamp >= horizon {
                break;
            }
            heap.pop_min(&mut self.edges)?;
            let slot = &mut self.degrees[rec.target as usize];
            let d = *slot;
            let nd = d.checked_sub(1).ok_or_else(|| {
                Error::InconsistentData(format!(
                    "expiring an edge into node index {} whose degree is already 0",
                    rec.target
                ))
            })?;
            *slot = nd;
            if let Some(index) = self.ranks.as_mut() {
                index.replace(d, nd)?;
            }
            self.stats.bump(EventKind::DegreeDecrease);
            if sink.wants_bookkeeping() {
                let expired_at = rec.timestamp.saturating_add(self.options.window);
                let flag = contract_flag(&self.nodes, self.options.contracts, rec.target);
                sink.record(
                    &EventRecord::new(EventKind::DegreeDecrease, nd, expired_at).with_contract(flag),
                    None,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectingSink;
    use pa_tree::{build_index, Allocator, TreeVariant};

    fn edge(source: u32, target: u32, timestamp: u32, record: u64) -> EdgeInput {
        EdgeInput {
            source,
            target,
            timestamp,
            record,
        }
    }

    fn processor(window: u32, exponents: Option<&[f64]>) -> EdgeStreamProcessor {
        let options = ProcessorOptions {
            window,
            ..ProcessorOptions::default()
        };
        let ranks = exponents.map(|a| build_index::<u32>(TreeVariant::Multiset, Allocator::Compact, a));
        EdgeStreamProcessor::new(options, NodeIndex::dynamic(), EdgeStore::new(), ranks).unwrap()
    }

    fn run(p: &mut EdgeStreamProcessor, edges: &[(u32, u32, u32)]) -> CollectingSink {
        let mut sink = CollectingSink::with_bookkeeping();
        for (i, &(s, t, ts)) in edges.iter().enumerate() {
            p.process(&edge(s, t, ts, i as u64 + 1), &mut sink).unwrap();
            p.check().unwrap();
        }
        sink
    }

    fn ev(kind: EventKind, degree: u32, ts: u32) -> EventRecord {
        EventRecord::new(kind, degree, ts)
    }

    #[test]
    fn test_expiry_then_reactivation() {
        let (a, b) = (1, 2);
        let mut p = processor(20, Some(&[1.0]));
        let sink = run(&mut p, &[(a, b, 10)]);
        assert_eq!(
            sink.records(),
            vec![
                ev(EventKind::NewNodeEdge, 0, 10),
                ev(EventKind::DegreeIncrease, 1, 10),
            ]
        );
        assert_eq!(sink.events[0].1.as_ref().map(|r| r.weighted[0]), Some(0.0));
        assert_eq!(p.degree(b), Some(1));

        let sink = run(&mut p, &[(a, b, 50)]);
        assert_eq!(
            sink.records(),
            vec![
                ev(EventKind::DegreeDecrease, 0, 30),
                ev(EventKind::ReactivatedEdge, 0, 50),
                ev(EventKind::DegreeIncrease, 1, 50),
            ]
        );
        assert_eq!(p.degree(b), Some(1));
        assert_eq!(p.active_edges(), 1);
    }

    #[test]
    fn test_classification_kinds() {
        let mut p = processor(100, None);
        let sink = run(
            &mut p,
            &[(1, 2, 1), (1, 3, 2), (1, 2, 3), (4, 2, 4)],
        );
        let kinds: Vec<_> = sink
            .records()
            .into_iter()
            .filter(|e| e.kind.is_classification())
            .map(|e| (e.kind, e.degree))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (EventKind::NewNodeEdge, 0),
                (EventKind::NewEdge, 0),
                (EventKind::RefreshActiveEdge, 1),
                (EventKind::NewNodeEdge, 1),
            ]
        );
        assert_eq!(p.stats().count(EventKind::DegreeIncrease), 3);
        assert_eq!(p.degree(2), Some(2));
    }

    #[test]
    fn test_refresh_keeps_edge_alive() {
        let mut p = processor(10, None);
        run(&mut p, &[(1, 2, 0), (1, 2, 8), (3, 4, 15)]);
        // Refreshed at 8, so still active at 15.
        assert_eq!(p.degree(2), Some(1));
        run(&mut p, &[(3, 4, 19)]);
        assert_eq!(p.degree(2), Some(0));
    }

    #[test]
    fn test_edge_at_horizon_is_still_active() {
        let mut p = processor(10, None);
        run(&mut p, &[(1, 2, 5), (3, 4, 15)]);
        assert_eq!(p.degree(2), Some(1));
        run(&mut p, &[(3, 4, 16)]);
        assert_eq!(p.degree(2), Some(0));
    }

    #[test]
    fn test_unbounded_window_never_expires() {
        let mut p = processor(0, Some(&[0.0]));
        let sink = run(&mut p, &[(1, 2, 1), (1, 2, 4_000_000_000), (3, 2, 4_000_000_001)]);
        assert!(sink.records().iter().all(|e| e.kind != EventKind::DegreeDecrease));
        assert_eq!(sink.records()[2].kind, EventKind::RefreshActiveEdge);
        assert_eq!(p.degree(2), Some(2));
    }

    #[test]
    fn test_weighted_rank_before_update() {
        let mut p = processor(0, Some(&[0.0]));
        // Degrees: node 10 -> 2, node 11 -> 1.
        let sink = run(&mut p, &[(1, 10, 1), (2, 10, 2), (3, 11, 3), (4, 11, 4)]);
        let (last, rank) = sink.events.last().cloned().unwrap();
        assert_eq!(last.kind, EventKind::DegreeIncrease);
        let (classified, rank_last) = &sink.events[sink.events.len() - 2];
        assert_eq!(classified.degree, 1);
        let rank_last = rank_last.as_ref().unwrap();
        // {1, 2}: degree 1 covers one of two units.
        assert_eq!(rank_last.weighted, vec![0.5]);
        assert_eq!((rank_last.count, rank_last.norm_count), (1, 2));
        assert!(rank.is_none());
    }

    #[test]
    fn test_self_loops_are_ignored() {
        let mut p = processor(10, None);
        let sink = run(&mut p, &[(1, 1, 5), (1, 2, 6)]);
        assert_eq!(p.stats().self_loops, 1);
        assert_eq!(p.stats().records, 2);
        assert_eq!(sink.records()[0].kind, EventKind::NewNodeEdge);
    }

    #[test]
    fn test_unsorted_input() {
        let mut p = processor(10, None);
        let mut sink = CollectingSink::new();
        p.process(&edge(1, 2, 50, 1), &mut sink).unwrap();
        let err = p.process(&edge(3, 4, 40, 2), &mut sink).unwrap_err();
        match err {
            Error::UnsortedInput {
                position,
                timestamp,
                previous,
            } => {
                assert_eq!(position.record, 2);
                assert_eq!((timestamp, previous), (40, 50));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sink.events.len(), 1);
    }

    #[test]
    fn test_refresh_with_older_timestamp_is_unsorted_even_when_lenient() {
        let options = ProcessorOptions {
            window: 100,
            strict_order: false,
            ..ProcessorOptions::default()
        };
        let mut p =
            EdgeStreamProcessor::new(options, NodeIndex::dynamic(), EdgeStore::new(), None).unwrap();
        let mut sink = CollectingSink::new();
        p.process(&edge(1, 2, 50, 1), &mut sink).unwrap();
        p.process(&edge(3, 4, 45, 2), &mut sink).unwrap();
        let err = p.process(&edge(1, 2, 40, 3), &mut sink).unwrap_err();
        assert!(matches!(err, Error::UnsortedInput { .. }));
    }

    #[test]
    fn test_contract_flags() {
        let nodes = NodeIndex::fixed(vec![(1, true), (2, false), (3, true)], true).unwrap();
        let options = ProcessorOptions {
            contracts: true,
            ..ProcessorOptions::default()
        };
        let mut p = EdgeStreamProcessor::new(options, nodes, EdgeStore::new(), None).unwrap();
        let sink = run(&mut p, &[(1, 2, 1), (2, 3, 2)]);
        let flags: Vec<_> = sink.records().iter().map(|e| (e.kind.code(), e.contract)).collect();
        assert_eq!(
            flags,
            vec![(3, Some(2)), (1, Some(0)), (3, Some(1)), (1, Some(1))]
        );
    }

    #[test]
    fn test_contracts_without_flag_data() {
        let options = ProcessorOptions {
            contracts: true,
            ..ProcessorOptions::default()
        };
        let err = EdgeStreamProcessor::new(options, NodeIndex::dynamic(), EdgeStore::new(), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_node_in_fixed_index() {
        let nodes = NodeIndex::fixed(vec![(1, false), (2, false)], false).unwrap();
        let mut p =
            EdgeStreamProcessor::new(ProcessorOptions::default(), nodes, EdgeStore::new(), None)
                .unwrap();
        let mut sink = CollectingSink::new();
        let err = p.process(&edge(1, 9, 1, 7), &mut sink).unwrap_err();
        match err {
            Error::InconsistentData(msg) => assert!(msg.contains("record 7"), "{}", msg),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_link_in_frozen_store() {
        let nodes = NodeIndex::fixed(vec![(1, false), (2, false), (3, false)], false).unwrap();
        let edges = EdgeStore::preload([(0, 1)]).unwrap();
        let mut p = EdgeStreamProcessor::new(ProcessorOptions::default(), nodes, edges, None).unwrap();
        let mut sink = CollectingSink::new();
        p.process(&edge(1, 2, 1, 1), &mut sink).unwrap();
        let err = p.process(&edge(1, 3, 2, 2), &mut sink).unwrap_err();
        assert!(matches!(err, Error::InconsistentData(_)));
    }
}
