//! Edge stream processing.

pub mod processor;
pub mod stats;

pub use processor::{EdgeStreamProcessor, ProcessorOptions};
pub use stats::StreamStats;

use crate::input::EdgeSource;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::sink::EventSink;
use pa_common::{EventKind, Result};
use std::time::Instant;

/// Drive `processor` over every edge of `source`.
///
/// Logs progress every `progress_every` records (0 disables it) and a
/// summary at the end. The sink is not finished here so the caller can
/// flush it on both the success and the error path.
pub fn run_stream(
    processor: &mut EdgeStreamProcessor,
    source: &mut dyn EdgeSource,
    sink: &mut dyn EventSink,
    progress_every: u64,
    ctx: &LogContext,
) -> Result<StreamStats> {
    let started = Instant::now();
    let mut next_progress = progress_every;
    while let Some(edge) = source.next_edge()? {
        processor.process(&edge, sink)?;
        let stats = processor.stats();
        if progress_every > 0 && stats.records >= next_progress {
            next_progress += progress_every;
            log_event!(
                ctx,
                INFO,
                event_names::STREAM_PROGRESS,
                Stage::Stream,
                "edges processed",
                records = stats.records,
                degree_changes = stats.degree_changes(),
                rank_queries = stats.rank_queries,
                active_edges = processor.active_edges() as u64
            );
        }
    }
    processor.stats_mut().skipped = source.skipped();

    let stats = processor.stats().clone();
    log_event!(
        ctx,
        INFO,
        event_names::STREAM_FINISHED,
        Stage::Stream,
        "edge stream finished",
        records = stats.records,
        skipped = stats.skipped,
        self_loops = stats.self_loops,
        decreases = stats.count(EventKind::DegreeDecrease),
        increases = stats.count(EventKind::DegreeIncrease),
        new_edges = stats.count(EventKind::NewEdge),
        new_node_edges = stats.count(EventKind::NewNodeEdge),
        refreshed = stats.count(EventKind::RefreshActiveEdge),
        reactivated = stats.count(EventKind::ReactivatedEdge),
        rank_queries = stats.rank_queries,
        elapsed_ms = started.elapsed().as_millis() as u64
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{NodeIndex, TableReader, TextEdgeReader};
    use crate::sink::CollectingSink;
    use pa_heap::EdgeStore;
    use std::io::Cursor;

    #[test]
    fn test_run_stream_counts() {
        let text = "1 2 10\n-1 2 11\n3 3 12\n4 2 13\n";
        let mut source = TextEdgeReader::new(TableReader::new(Cursor::new(text.as_bytes().to_vec())), true);
        let mut processor = EdgeStreamProcessor::new(
            ProcessorOptions::default(),
            NodeIndex::dynamic(),
            EdgeStore::new(),
            None,
        )
        .unwrap();
        let mut sink = CollectingSink::new();
        let stats = run_stream(&mut processor, &mut source, &mut sink, 1, &LogContext::new("run-test")).unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.self_loops, 1);
        assert_eq!(stats.classified(), 2);
        assert_eq!(sink.events.len(), 2);
    }
}
