//! Event sinks.
//!
//! The processor and the replays hand every emitted event to one
//! [`EventSink`]. Sinks choose their own encoding and routing:
//! - [`TsvSink`] / [`JsonlSink`]: one record per line on a single writer
//! - [`SplitRankSink`]: one rank file per exponent and classification kind
//! - [`HistogramSink`]: binned ranks per exponent and classification kind
//! - [`CollectingSink`]: in-memory, for tests and embedding
//!
//! Every sink writes whole lines only, so flushing after a fatal error never
//! leaves a truncated record behind.

pub mod histogram;
pub mod split;

pub use histogram::{bin_count, bin_index, HistogramSink};
pub use split::{split_path, SplitRankSink};

use pa_common::{EventRecord, OutputFormat, RankSample, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;

/// Destination for emitted events.
pub trait EventSink {
    /// Whether degree-change events (kinds 0 and 1) should be delivered.
    fn wants_bookkeeping(&self) -> bool {
        false
    }

    /// Accept one event. `rank` is present for classification events when a
    /// rank index is being maintained.
    fn record(&mut self, event: &EventRecord, rank: Option<&RankSample>) -> Result<()>;

    /// Push complete lines produced so far to the underlying writers.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Write any trailing output, then flush.
    fn finish(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Which columns follow the event on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Columns {
    /// Event log: `kind degree timestamp [contract]`, all kinds.
    Events,
    /// `kind degree timestamp [contract] rank_0 .. rank_{M-1}`.
    Weighted,
    /// `kind degree count norm_count`.
    Unweighted,
}

/// Tab-separated output.
pub struct TsvSink<W: Write> {
    out: W,
    columns: Columns,
    line: String,
}

impl<W: Write> TsvSink<W> {
    pub fn new(out: W, columns: Columns) -> Self {
        TsvSink {
            out,
            columns,
            line: String::with_capacity(64),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for TsvSink<W> {
    fn wants_bookkeeping(&self) -> bool {
        self.columns == Columns::Events
    }

    fn record(&mut self, event: &EventRecord, rank: Option<&RankSample>) -> Result<()> {
        self.line.clear();
        // Writing into a String cannot fail.
        let _ = match (self.columns, rank) {
            (Columns::Unweighted, Some(r)) => write!(
                self.line,
                "{}\t{}\t{}\t{}",
                event.kind, event.degree, r.count, r.norm_count
            ),
            _ => write!(self.line, "{}", event),
        };
        if let (Columns::Weighted, Some(r)) = (self.columns, rank) {
            for x in &r.weighted {
                let _ = write!(self.line, "\t{}", x);
            }
        }
        self.line.push('\n');
        self.out.write_all(self.line.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    #[serde(flatten)]
    event: &'a EventRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    ranks: Option<&'a [f64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    norm_count: Option<u64>,
}

/// One JSON object per line.
pub struct JsonlSink<W: Write> {
    out: W,
    columns: Columns,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(out: W, columns: Columns) -> Self {
        JsonlSink { out, columns }
    }
}

impl<W: Write> EventSink for JsonlSink<W> {
    fn wants_bookkeeping(&self) -> bool {
        self.columns == Columns::Events
    }

    fn record(&mut self, event: &EventRecord, rank: Option<&RankSample>) -> Result<()> {
        let mut json = JsonEvent {
            event,
            ranks: None,
            count: None,
            norm_count: None,
        };
        match (self.columns, rank) {
            (Columns::Weighted, Some(r)) => json.ranks = Some(&r.weighted),
            (Columns::Unweighted, Some(r)) => {
                json.count = Some(r.count);
                json.norm_count = Some(r.norm_count);
            }
            _ => {}
        }
        let mut line = serde_json::to_vec(&json)?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Line sink on `out` for the requested format.
pub fn line_sink<'a, W: Write + 'a>(
    out: W,
    format: OutputFormat,
    columns: Columns,
) -> Box<dyn EventSink + 'a> {
    match format {
        OutputFormat::Tsv => Box::new(TsvSink::new(out, columns)),
        OutputFormat::Jsonl => Box::new(JsonlSink::new(out, columns)),
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub bookkeeping: bool,
    pub events: Vec<(EventRecord, Option<RankSample>)>,
}

impl CollectingSink {
    /// Collects classification events only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects bookkeeping events too.
    pub fn with_bookkeeping() -> Self {
        CollectingSink {
            bookkeeping: true,
            events: Vec::new(),
        }
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.events.iter().map(|(e, _)| *e).collect()
    }
}

impl EventSink for CollectingSink {
    fn wants_bookkeeping(&self) -> bool {
        self.bookkeeping
    }

    fn record(&mut self, event: &EventRecord, rank: Option<&RankSample>) -> Result<()> {
        self.events.push((*event, rank.cloned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pa_common::EventKind;

    fn sample() -> RankSample {
        RankSample {
            weighted: vec![0.25, 1.0],
            count: 3,
            norm_count: 8,
        }
    }

    fn tsv(columns: Columns, event: EventRecord, rank: Option<&RankSample>) -> String {
        let mut sink = TsvSink::new(Vec::new(), columns);
        sink.record(&event, rank).unwrap();
        sink.finish().unwrap();
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_tsv_columns() {
        let ev = EventRecord::new(EventKind::NewEdge, 2, 100).with_contract(Some(1));
        assert_eq!(tsv(Columns::Events, ev, None), "2\t2\t100\t1\n");
        assert_eq!(
            tsv(Columns::Weighted, ev, Some(&sample())),
            "2\t2\t100\t1\t0.25\t1\n"
        );
        assert_eq!(tsv(Columns::Unweighted, ev, Some(&sample())), "2\t2\t3\t8\n");
    }

    #[test]
    fn test_only_event_logs_want_bookkeeping() {
        assert!(TsvSink::new(Vec::new(), Columns::Events).wants_bookkeeping());
        assert!(!TsvSink::new(Vec::new(), Columns::Weighted).wants_bookkeeping());
        assert!(!JsonlSink::new(Vec::new(), Columns::Unweighted).wants_bookkeeping());
    }

    #[test]
    fn test_jsonl_weighted() {
        let mut out = Vec::new();
        {
            let mut sink = JsonlSink::new(&mut out, Columns::Weighted);
            let ev = EventRecord::new(EventKind::ReactivatedEdge, 1, 50);
            sink.record(&ev, Some(&sample())).unwrap();
            sink.finish().unwrap();
        }
        let line = String::from_utf8(out).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["kind"], "reactivated_edge");
        assert_eq!(value["degree"], 1);
        assert_eq!(value["ranks"][0], 0.25);
        assert!(value.get("count").is_none());
    }

    #[test]
    fn test_collecting_sink() {
        let mut sink = CollectingSink::new();
        let ev = EventRecord::new(EventKind::NewNodeEdge, 0, 10);
        sink.record(&ev, Some(&sample())).unwrap();
        assert_eq!(sink.records(), vec![ev]);
        assert_eq!(sink.events[0].1.as_ref().map(|r| r.count), Some(3));
    }
}
