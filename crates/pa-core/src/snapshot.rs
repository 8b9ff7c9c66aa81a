//! Distribution snapshots.
//!
//! Replays a change stream and writes the full distribution of values
//! (node degrees or address balances) at fixed points in stream time. Only
//! positive values are counted. A snapshot due at `t` holds every change
//! with a timestamp up to and including `t`; one last snapshot is written
//! at the next pending boundary when the input ends.

use crate::balances::BalanceSource;
use crate::config::SnapshotConfig;
use crate::input::{EventLogReader, TxTimeReader};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use pa_common::{Error, EventKind, EventRecord, OutputFormat, Position, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::time::Instant;

/// Counts per value, in value order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Distribution<K> {
    counts: BTreeMap<K, u64>,
}

impl<K: Ord + Copy + Display> Distribution<K> {
    pub fn new() -> Self {
        Distribution {
            counts: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn remove(&mut self, key: K) -> Result<()> {
        match self.counts.get_mut(&key) {
            Some(n) if *n > 1 => *n -= 1,
            Some(_) => {
                self.counts.remove(&key);
            }
            None => {
                return Err(Error::KeyNotFound {
                    key: key.to_string(),
                    operation: "snapshot_remove",
                })
            }
        }
        Ok(())
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, key: K) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, u64)> + '_ {
        self.counts.iter().map(|(&k, &n)| (k, n))
    }
}

/// Snapshot boundaries, `interval` seconds apart.
#[derive(Debug, Clone)]
pub struct SnapshotClock {
    interval: u64,
    next: Option<u64>,
    started: bool,
}

impl SnapshotClock {
    /// Without `start`, the first boundary is one interval after the first
    /// timestamp seen.
    pub fn new(interval: u32, start: Option<u32>) -> Result<Self> {
        if interval == 0 {
            return Err(Error::Config("snapshot interval must be positive".to_string()));
        }
        Ok(SnapshotClock {
            interval: u64::from(interval),
            next: start.map(u64::from),
            started: false,
        })
    }

    /// Next boundary, once known.
    pub fn pending(&self) -> Option<u64> {
        self.next
    }

    /// Move the clock to `ts`, calling `emit` for every boundary strictly
    /// below it. Boundaries passed before the first timestamp are skipped.
    pub fn advance(&mut self, ts: u32, mut emit: impl FnMut(u64) -> Result<()>) -> Result<()> {
        let ts = u64::from(ts);
        let next = self.next.get_or_insert(ts + self.interval);
        while *next < ts {
            if self.started {
                emit(*next)?;
            }
            *next += self.interval;
        }
        self.started = true;
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotLine<K> {
    timestamp: u64,
    value: K,
    count: u64,
}

/// `timestamp value count` lines, or JSONL objects with the same fields.
pub struct SnapshotWriter<W: Write> {
    out: W,
    format: OutputFormat,
    snapshots: u64,
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        SnapshotWriter {
            out,
            format,
            snapshots: 0,
        }
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    pub fn write<K>(&mut self, timestamp: u64, dist: &Distribution<K>) -> Result<()>
    where
        K: Ord + Copy + Display + Serialize,
    {
        for (value, count) in dist.iter() {
            match self.format {
                OutputFormat::Tsv => writeln!(self.out, "{}\t{}\t{}", timestamp, value, count)?,
                OutputFormat::Jsonl => {
                    let mut line = serde_json::to_vec(&SnapshotLine {
                        timestamp,
                        value,
                        count,
                    })?;
                    line.push(b'\n');
                    self.out.write_all(&line)?;
                }
            }
        }
        self.snapshots += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub records: u64,
    pub snapshots: u64,
    /// Distinct values in the last snapshot.
    pub values: u64,
}

fn write_snapshot<K, W>(
    out: &mut SnapshotWriter<W>,
    timestamp: u64,
    dist: &Distribution<K>,
    ctx: &LogContext,
) -> Result<()>
where
    K: Ord + Copy + Display + Serialize,
    W: Write,
{
    out.write(timestamp, dist)?;
    log_event!(
        ctx,
        DEBUG,
        event_names::SNAPSHOT_WRITTEN,
        Stage::Output,
        "snapshot written",
        timestamp = timestamp,
        values = dist.len() as u64
    );
    Ok(())
}

/// Degree distribution of the nodes in an event log.
pub struct DegreeSnapshots {
    dist: Distribution<u32>,
    clock: SnapshotClock,
    require_sorted: bool,
    last_ts: Option<u32>,
    records: u64,
}

impl DegreeSnapshots {
    pub fn new(config: &SnapshotConfig) -> Result<Self> {
        Ok(DegreeSnapshots {
            dist: Distribution::new(),
            clock: SnapshotClock::new(config.interval.seconds(), config.start)?,
            require_sorted: config.require_sorted,
            last_ts: None,
            records: 0,
        })
    }

    pub fn distribution(&self) -> &Distribution<u32> {
        &self.dist
    }

    /// Apply one event. Bookkeeping events carry the degree after the
    /// change; classification events only move the clock.
    pub fn apply<W: Write>(
        &mut self,
        event: &EventRecord,
        record: u64,
        out: &mut SnapshotWriter<W>,
        ctx: &LogContext,
    ) -> Result<()> {
        let ts = event.timestamp;
        if self.require_sorted {
            if let Some(prev) = self.last_ts.filter(|&p| ts < p) {
                return Err(Error::UnsortedInput {
                    position: Position::new(record),
                    timestamp: ts,
                    previous: prev,
                });
            }
            self.last_ts = Some(ts);
        }
        let dist = &self.dist;
        self.clock.advance(ts, |at| write_snapshot(out, at, dist, ctx))?;
        self.records += 1;

        let d = event.degree;
        let old = match event.kind {
            EventKind::DegreeDecrease => d.checked_add(1).ok_or_else(|| Error::Overflow {
                position: Position::new(record).with_field(2),
            })?,
            EventKind::DegreeIncrease => d.checked_sub(1).ok_or_else(|| {
                Error::InconsistentData(format!(
                    "degree increase to 0 ({})",
                    Position::new(record)
                ))
            })?,
            _ => return Ok(()),
        };
        if old > 0 {
            self.dist.remove(old)?;
        }
        if d > 0 {
            self.dist.add(d);
        }
        Ok(())
    }

    /// Write the last snapshot.
    pub fn finish<W: Write>(&self, out: &mut SnapshotWriter<W>, ctx: &LogContext) -> Result<SnapshotStats> {
        if let Some(at) = self.clock.pending() {
            write_snapshot(out, at, &self.dist, ctx)?;
        }
        out.flush()?;
        Ok(SnapshotStats {
            records: self.records,
            snapshots: out.snapshots(),
            values: self.dist.len() as u64,
        })
    }
}

/// Write degree snapshots of a whole event log.
pub fn run_degree_snapshots<R: BufRead, W: Write>(
    snapshots: &mut DegreeSnapshots,
    log: &mut EventLogReader<R>,
    out: &mut SnapshotWriter<W>,
    progress_every: u64,
    ctx: &LogContext,
) -> Result<SnapshotStats> {
    let started = Instant::now();
    let mut next_progress = progress_every;
    while let Some(event) = log.next_event()? {
        snapshots.apply(&event, log.record(), out, ctx)?;
        if progress_every > 0 && snapshots.records >= next_progress {
            next_progress += progress_every;
            log_event!(
                ctx,
                INFO,
                event_names::REPLAY_PROGRESS,
                Stage::Replay,
                "events replayed",
                records = snapshots.records,
                snapshots = out.snapshots()
            );
        }
    }
    let stats = snapshots.finish(out, ctx)?;
    log_event!(
        ctx,
        INFO,
        event_names::REPLAY_FINISHED,
        Stage::Replay,
        "degree snapshots written",
        records = stats.records,
        snapshots = stats.snapshots,
        values = stats.values,
        elapsed_ms = started.elapsed().as_millis() as u64
    );
    Ok(stats)
}

/// Write balance snapshots. Every change must carry a txid, which is
/// looked up in `times`.
pub fn run_balance_snapshots<T: BufRead, W: Write>(
    source: &mut dyn BalanceSource,
    times: &mut TxTimeReader<T>,
    interval: u32,
    out: &mut SnapshotWriter<W>,
    progress_every: u64,
    ctx: &LogContext,
) -> Result<SnapshotStats> {
    let started = Instant::now();
    let mut clock = SnapshotClock::new(interval, None)?;
    let mut dist = Distribution::<i64>::new();
    let mut records = 0u64;
    let mut next_progress = progress_every;
    while let Some(change) = source.next_change()? {
        let txid = change.txid.ok_or_else(|| {
            Error::InconsistentData(format!(
                "balance change without a transaction id ({})",
                Position::new(change.record)
            ))
        })?;
        let ts = times.timestamp_of(txid)?;
        clock.advance(ts, |at| write_snapshot(out, at, &dist, ctx))?;
        if change.old > 0 {
            dist.remove(change.old)?;
        }
        if change.new > 0 {
            dist.add(change.new);
        }
        records += 1;
        if progress_every > 0 && records >= next_progress {
            next_progress += progress_every;
            log_event!(
                ctx,
                INFO,
                event_names::REPLAY_PROGRESS,
                Stage::Replay,
                "balance changes replayed",
                records = records,
                snapshots = out.snapshots()
            );
        }
    }
    if let Some(at) = clock.pending() {
        write_snapshot(out, at, &dist, ctx)?;
    }
    out.flush()?;
    let stats = SnapshotStats {
        records,
        snapshots: out.snapshots(),
        values: dist.len() as u64,
    };
    log_event!(
        ctx,
        INFO,
        event_names::REPLAY_FINISHED,
        Stage::Replay,
        "balance snapshots written",
        records = stats.records,
        snapshots = stats.snapshots,
        values = stats.values,
        elapsed_ms = started.elapsed().as_millis() as u64
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances::TxBalanceSource;
    use crate::config::Window;
    use crate::input::{TableReader, TxSide, TxTableReader};
    use std::io::Cursor;

    fn table(text: &str) -> TableReader<Cursor<Vec<u8>>> {
        TableReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    fn ctx() -> LogContext {
        LogContext::new("run-s")
    }

    fn degrees(log: &str, config: SnapshotConfig) -> Result<String> {
        let mut snapshots = DegreeSnapshots::new(&config)?;
        let mut out = SnapshotWriter::new(Vec::new(), OutputFormat::Tsv);
        run_degree_snapshots(&mut snapshots, &mut EventLogReader::new(table(log)), &mut out, 0, &ctx())?;
        Ok(String::from_utf8(out.into_inner()).unwrap())
    }

    fn every(seconds: u32) -> SnapshotConfig {
        SnapshotConfig {
            interval: Window(seconds),
            ..SnapshotConfig::default()
        }
    }

    #[test]
    fn test_distribution_counts() {
        let mut d = Distribution::<u32>::new();
        d.add(2);
        d.add(2);
        d.add(1);
        d.remove(2).unwrap();
        assert_eq!(d.iter().collect::<Vec<_>>(), vec![(1, 1), (2, 1)]);
        d.remove(2).unwrap();
        assert_eq!(d.count(2), 0);
        assert_eq!(d.len(), 1);
        assert!(matches!(d.remove(7), Err(Error::KeyNotFound { .. })));
    }

    #[test]
    fn test_clock_skips_boundaries_before_first_timestamp() {
        let mut clock = SnapshotClock::new(10, Some(5)).unwrap();
        let mut seen = Vec::new();
        clock.advance(40, |t| {
            seen.push(t);
            Ok(())
        })
        .unwrap();
        assert!(seen.is_empty());
        assert_eq!(clock.pending(), Some(45));
        clock.advance(66, |t| {
            seen.push(t);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![45, 55, 65]);
        assert!(matches!(SnapshotClock::new(0, None), Err(Error::Config(_))));
    }

    #[test]
    fn test_degree_snapshots() {
        // Two nodes reach degree 1 at t=10, one of them degree 2 at t=25,
        // then degree 1 again at t=40.
        let log = "3\t0\t10\n1\t1\t10\n3\t0\t12\n1\t1\t12\n2\t1\t25\n1\t2\t25\n0\t1\t40\n";
        let out = degrees(log, every(10)).unwrap();
        assert_eq!(out, "20\t1\t2\n30\t1\t1\n30\t2\t1\n40\t1\t2\n");
    }

    #[test]
    fn test_boundary_includes_events_at_its_timestamp() {
        let out = degrees("1\t1\t10\n1\t2\t20\n", every(10)).unwrap();
        assert_eq!(out, "20\t2\t1\n");
    }

    #[test]
    fn test_explicit_start() {
        let config = SnapshotConfig {
            start: Some(100),
            ..every(50)
        };
        let out = degrees("1\t1\t120\n1\t1\t260\n", config).unwrap();
        assert_eq!(out, "150\t1\t1\n200\t1\t1\n250\t1\t1\n300\t1\t2\n");
    }

    #[test]
    fn test_unsorted_log() {
        let log = "1\t1\t20\n1\t1\t10\n";
        let err = degrees(log, every(10)).unwrap_err();
        assert!(matches!(err, Error::UnsortedInput { timestamp: 10, previous: 20, .. }));

        let config = SnapshotConfig {
            require_sorted: false,
            ..every(10)
        };
        assert_eq!(degrees(log, config).unwrap(), "30\t1\t2\n");
    }

    #[test]
    fn test_degree_errors() {
        assert!(matches!(
            degrees("1\t0\t1\n", every(10)),
            Err(Error::InconsistentData(_))
        ));
        assert!(matches!(
            degrees("0\t1\t1\n", every(10)),
            Err(Error::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_jsonl_snapshot() {
        let mut d = Distribution::<i64>::new();
        d.add(-3);
        d.add(5);
        let mut out = SnapshotWriter::new(Vec::new(), OutputFormat::Jsonl);
        out.write(7, &d).unwrap();
        assert_eq!(
            String::from_utf8(out.into_inner()).unwrap(),
            "{\"timestamp\":7,\"value\":-3,\"count\":1}\n{\"timestamp\":7,\"value\":5,\"count\":1}\n"
        );
    }

    #[test]
    fn test_balance_snapshots() {
        // Address 7 receives 10 in tx 1 (t=100); address 8 receives 4 in
        // tx 2 (t=150); address 7 spends 10 in tx 3 (t=260) and address 8
        // receives 6 in the same tx.
        let outputs = "1 0 7 10\n2 0 8 4\n3 0 8 6\n";
        let inputs = "3 0 1 0 7 10\n";
        let times = "1 100\n2 150\n3 260\n";
        let mut source = TxBalanceSource::new(
            TxTableReader::new(table(outputs), TxSide::Output),
            Some(TxTableReader::new(table(inputs), TxSide::Input)),
            true,
        )
        .unwrap();
        let mut times = TxTimeReader::new(table(times));
        let mut out = SnapshotWriter::new(Vec::new(), OutputFormat::Tsv);
        let stats = run_balance_snapshots(&mut source, &mut times, 100, &mut out, 0, &ctx()).unwrap();
        assert_eq!(
            String::from_utf8(out.into_inner()).unwrap(),
            "200\t4\t1\n200\t10\t1\n300\t10\t1\n"
        );
        assert_eq!(stats.records, 4);
        assert_eq!(stats.snapshots, 2);
        assert_eq!(source.balance(7), None);
    }

    #[test]
    fn test_balance_snapshot_needs_timestamps() {
        let mut source = TxBalanceSource::new(
            TxTableReader::new(table("1 0 7 10\n5 0 7 1\n"), TxSide::Output),
            None,
            true,
        )
        .unwrap();
        let mut times = TxTimeReader::new(table("1 100\n"));
        let mut out = SnapshotWriter::new(Vec::new(), OutputFormat::Tsv);
        let err = run_balance_snapshots(&mut source, &mut times, 100, &mut out, 0, &ctx()).unwrap_err();
        assert!(matches!(err, Error::InconsistentData(_)));
    }
}
