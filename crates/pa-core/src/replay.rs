//! Offline rank computation from an event log.
//!
//! Degree-change events (kinds 0 and 1) rebuild the degree distribution;
//! each classification event is ranked against the distribution as it
//! stands at that point of the log. Fed the log of a `generate` run, this
//! yields exactly the ranks of a fused run over the same edges.

use crate::input::EventLogReader;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::sink::EventSink;
use pa_common::{Error, EventKind, EventRecord, Position, RankSample, Result};
use pa_tree::RankIndex;
use serde::Serialize;
use std::io::BufRead;
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub events: u64,
    pub degree_changes: u64,
    pub rank_queries: u64,
}

pub struct RankReplay {
    index: Box<dyn RankIndex<u32>>,
    sample: RankSample,
    stats: ReplayStats,
}

impl RankReplay {
    pub fn new(index: Box<dyn RankIndex<u32>>) -> Self {
        let sample = RankSample::zeroed(index.width());
        RankReplay {
            index,
            sample,
            stats: ReplayStats::default(),
        }
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    pub fn index(&self) -> &dyn RankIndex<u32> {
        self.index.as_ref()
    }

    /// Apply one logged event. `record` locates it for diagnostics.
    pub fn apply(&mut self, event: &EventRecord, record: u64, sink: &mut dyn EventSink) -> Result<()> {
        self.stats.events += 1;
        let d = event.degree;
        match event.kind {
            EventKind::DegreeDecrease => {
                let old = d
                    .checked_add(1)
                    .ok_or_else(|| Error::Overflow {
                        position: Position::new(record).with_field(2),
                    })?;
                self.index.replace(old, d)?;
            }
            EventKind::DegreeIncrease => {
                let old = d.checked_sub(1).ok_or_else(|| {
                    Error::InconsistentData(format!(
                        "degree increase to 0 ({})",
                        Position::new(record)
                    ))
                })?;
                self.index.replace(old, d)?;
            }
            _ => {
                if d > 0 {
                    self.index.rank(d, &mut self.sample)?;
                } else {
                    self.sample.clear();
                    self.sample.norm_count = self.index.len();
                }
                self.stats.rank_queries += 1;
                return sink.record(event, Some(&self.sample));
            }
        }
        self.stats.degree_changes += 1;
        if sink.wants_bookkeeping() {
            sink.record(event, None)?;
        }
        Ok(())
    }
}

/// Replay every event of `log`. The sink is left for the caller to finish.
pub fn run_replay<R: BufRead>(
    replay: &mut RankReplay,
    log: &mut EventLogReader<R>,
    sink: &mut dyn EventSink,
    progress_every: u64,
    ctx: &LogContext,
) -> Result<ReplayStats> {
    let started = Instant::now();
    let mut next_progress = progress_every;
    while let Some(event) = log.next_event()? {
        replay.apply(&event, log.record(), sink)?;
        let stats = replay.stats();
        if progress_every > 0 && stats.events >= next_progress {
            next_progress += progress_every;
            log_event!(
                ctx,
                INFO,
                event_names::REPLAY_PROGRESS,
                Stage::Replay,
                "events replayed",
                events = stats.events,
                degree_changes = stats.degree_changes,
                rank_queries = stats.rank_queries
            );
        }
    }
    let stats = replay.stats().clone();
    log_event!(
        ctx,
        INFO,
        event_names::REPLAY_FINISHED,
        Stage::Replay,
        "event log replayed",
        events = stats.events,
        degree_changes = stats.degree_changes,
        rank_queries = stats.rank_queries,
        elapsed_ms = started.elapsed().as_millis() as u64
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::TableReader;
    use crate::sink::CollectingSink;
    use pa_tree::{build_index, Allocator, TreeVariant};
    use std::io::Cursor;

    fn replay(exponents: &[f64]) -> RankReplay {
        RankReplay::new(build_index::<u32>(TreeVariant::Map, Allocator::Boxed, exponents))
    }

    fn log(text: &str) -> EventLogReader<Cursor<Vec<u8>>> {
        EventLogReader::new(TableReader::new(Cursor::new(text.as_bytes().to_vec())))
    }

    #[test]
    fn test_replay_ranks() {
        // Degrees {1, 2} then a new edge into a degree-1 node.
        let text = "3\t0\t1\n1\t1\t1\n2\t0\t2\n1\t1\t2\n4\t1\t3\n1\t2\t4\n2\t1\t5\n";
        let mut r = replay(&[0.0]);
        let mut sink = CollectingSink::new();
        let stats = run_replay(&mut r, &mut log(text), &mut sink, 0, &LogContext::new("run-t")).unwrap();
        assert_eq!(stats.events, 7);
        assert_eq!(stats.degree_changes, 3);
        assert_eq!(stats.rank_queries, 4);
        let last = sink.events.last().unwrap().1.clone().unwrap();
        assert_eq!(last.weighted, vec![0.5]);
        assert_eq!((last.count, last.norm_count), (1, 2));
        let first = sink.events[0].1.clone().unwrap();
        assert_eq!((first.count, first.norm_count), (0, 0));
    }

    #[test]
    fn test_decrease_of_untracked_degree() {
        let mut r = replay(&[]);
        let mut sink = CollectingSink::new();
        let err = r
            .apply(&EventRecord::new(EventKind::DegreeDecrease, 2, 9), 1, &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound { .. }));
    }

    #[test]
    fn test_increase_to_zero_is_inconsistent() {
        let mut r = replay(&[]);
        let mut sink = CollectingSink::new();
        let err = r
            .apply(&EventRecord::new(EventKind::DegreeIncrease, 0, 9), 4, &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentData(ref m) if m.contains("record 4")));
    }

    #[test]
    fn test_bookkeeping_forwarded_on_request() {
        let mut r = replay(&[]);
        let mut sink = CollectingSink::with_bookkeeping();
        r.apply(&EventRecord::new(EventKind::DegreeIncrease, 1, 9), 1, &mut sink)
            .unwrap();
        r.apply(&EventRecord::new(EventKind::NewEdge, 1, 10), 2, &mut sink)
            .unwrap();
        assert_eq!(sink.events.len(), 2);
        assert!(sink.events[0].1.is_none());
        let rank = sink.events[1].1.clone().unwrap();
        assert_eq!((rank.count, rank.norm_count), (1, 1));
        assert!(rank.weighted.is_empty());
    }
}
