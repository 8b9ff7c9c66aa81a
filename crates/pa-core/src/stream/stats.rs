//! Run counters.

use pa_common::EventKind;
use serde::Serialize;

/// Counters accumulated over one pass of the edge stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Input records consumed, self-loops included.
    pub records: u64,
    pub self_loops: u64,
    /// Records dropped by the reader for out-of-range node ids.
    pub skipped: u64,
    /// Events per kind code, whether or not the sink took them.
    pub events: [u64; 6],
    pub rank_queries: u64,
}

impl StreamStats {
    pub fn count(&self, kind: EventKind) -> u64 {
        self.events[kind.code() as usize]
    }

    pub(crate) fn bump(&mut self, kind: EventKind) {
        self.events[kind.code() as usize] += 1;
    }

    /// Degree increases plus decreases.
    pub fn degree_changes(&self) -> u64 {
        self.count(EventKind::DegreeDecrease) + self.count(EventKind::DegreeIncrease)
    }

    /// Classified edges, one per non-self-loop record.
    pub fn classified(&self) -> u64 {
        EventKind::CLASSIFICATIONS
            .iter()
            .map(|&k| self.count(k))
            .sum()
    }
}
