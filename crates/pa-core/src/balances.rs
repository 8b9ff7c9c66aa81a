//! Balance replay.
//!
//! Same rank machinery as the degree replay, keyed by signed balances.
//! Changes come either from `old new [txid]` records or straight from the
//! transaction tables, merged on txid. Only balances strictly above a
//! threshold, and not explicitly excluded, are part of the distribution.
//! Whenever a tracked balance is credited and grows (or stays put), the
//! rank of the old balance is reported before the distribution is updated.
//! Debits from transaction inputs move balances but are never ranked.

use crate::input::{TableError, TableReader, TxRow, TxSide, TxTableReader};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::sink::{bin_count, bin_index};
use pa_common::{Error, OutputFormat, Position, RankSample, Result};
use pa_tree::RankIndex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceChange {
    pub old: i64,
    pub new: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<u64>,
    #[serde(skip)]
    pub record: u64,
    /// False for debits from transaction inputs, which are never ranked.
    #[serde(skip)]
    pub credit: bool,
}

/// Pull-based stream of balance changes. `Ok(None)` is end of input.
pub trait BalanceSource {
    fn next_change(&mut self) -> Result<Option<BalanceChange>>;
}

/// `old new [txid]` records.
pub struct BalanceReader<R> {
    table: TableReader<R>,
}

impl<R: BufRead> BalanceReader<R> {
    pub fn new(table: TableReader<R>) -> Self {
        BalanceReader { table }
    }
}

impl<R: BufRead> BalanceSource for BalanceReader<R> {
    fn next_change(&mut self) -> Result<Option<BalanceChange>> {
        if !self.table.read_line() {
            return match self.table.last_error() {
                TableError::Eof => Ok(None),
                _ => Err(self.table.error()),
            };
        }
        let (Some(old), Some(new)) = (self.table.read_i64(), self.table.read_i64()) else {
            return Err(self.table.error());
        };
        let mut txid = None;
        if self.table.has_more_fields() {
            txid = Some(self.table.read_u64().ok_or_else(|| self.table.error())?);
        }
        Ok(Some(BalanceChange {
            old,
            new,
            txid,
            record: self.table.line_number(),
            credit: true,
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TxMergeStats {
    pub inputs: u64,
    pub outputs: u64,
    /// Addresses with a known balance.
    pub addresses: u64,
}

/// Balance changes derived from the transaction tables.
///
/// Rows of both tables are merged on txid, inputs first on a tie. The
/// stream ends with the last output row; inputs left over after it are
/// not read.
pub struct TxBalanceSource<R> {
    outputs: TxTableReader<R>,
    inputs: Option<TxTableReader<R>>,
    next_out: Option<TxRow>,
    next_in: Option<TxRow>,
    balances: HashMap<u64, i64>,
    forget_zero: bool,
    stats: TxMergeStats,
}

impl<R: BufRead> TxBalanceSource<R> {
    /// `forget_zero` drops addresses whose balance a debit brings to zero.
    pub fn new(
        mut outputs: TxTableReader<R>,
        mut inputs: Option<TxTableReader<R>>,
        forget_zero: bool,
    ) -> Result<Self> {
        let misplaced = inputs.as_ref().is_some_and(|i| i.side() != TxSide::Input);
        if outputs.side() != TxSide::Output || misplaced {
            return Err(Error::Config(
                "transaction tables passed in the wrong order".to_string(),
            ));
        }
        let next_out = outputs.next_row()?;
        let next_in = match inputs.as_mut() {
            Some(r) => r.next_row()?,
            None => None,
        };
        Ok(TxBalanceSource {
            outputs,
            inputs,
            next_out,
            next_in,
            balances: HashMap::new(),
            forget_zero,
            stats: TxMergeStats::default(),
        })
    }

    pub fn stats(&self) -> &TxMergeStats {
        &self.stats
    }

    /// Current balance of an address, if known.
    pub fn balance(&self, address: u64) -> Option<i64> {
        self.balances.get(&address).copied()
    }

    fn debit(&mut self, row: TxRow) -> Result<BalanceChange> {
        let value = signed(row.value, row.record)?;
        let old = self.balances.get(&row.address).copied().unwrap_or(0);
        let new = old.checked_sub(value).ok_or_else(|| Error::Overflow {
            position: Position::new(row.record),
        })?;
        if new == 0 && self.forget_zero {
            self.balances.remove(&row.address);
        } else {
            self.balances.insert(row.address, new);
        }
        self.stats.inputs += 1;
        Ok(BalanceChange {
            old,
            new,
            txid: Some(row.txid),
            record: row.record,
            credit: false,
        })
    }

    fn credit(&mut self, row: TxRow) -> Result<BalanceChange> {
        let value = signed(row.value, row.record)?;
        let old = self.balances.get(&row.address).copied().unwrap_or(0);
        let new = old.checked_add(value).ok_or_else(|| Error::Overflow {
            position: Position::new(row.record),
        })?;
        self.balances.insert(row.address, new);
        self.stats.outputs += 1;
        Ok(BalanceChange {
            old,
            new,
            txid: Some(row.txid),
            record: row.record,
            credit: true,
        })
    }
}

fn signed(value: u64, record: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Overflow {
        position: Position::new(record),
    })
}

impl<R: BufRead> BalanceSource for TxBalanceSource<R> {
    fn next_change(&mut self) -> Result<Option<BalanceChange>> {
        let Some(out) = self.next_out else {
            return Ok(None);
        };
        let change = match self.next_in {
            Some(row) if row.txid <= out.txid => {
                self.next_in = match self.inputs.as_mut() {
                    Some(r) => r.next_row()?,
                    None => None,
                };
                self.debit(row)?
            }
            _ => {
                self.next_out = self.outputs.next_row()?;
                self.credit(out)?
            }
        };
        self.stats.addresses = self.balances.len() as u64;
        Ok(Some(change))
    }
}

/// Write every change of `source` as `old new [txid]` lines (or JSONL).
pub fn write_changes(
    source: &mut dyn BalanceSource,
    out: &mut dyn Write,
    format: OutputFormat,
) -> Result<u64> {
    let mut written = 0;
    let mut line = String::with_capacity(48);
    while let Some(change) = source.next_change()? {
        line.clear();
        match format {
            OutputFormat::Jsonl => {
                line.push_str(&serde_json::to_string(&change)?);
            }
            OutputFormat::Tsv => {
                let _ = write!(line, "{}\t{}", change.old, change.new);
                if let Some(txid) = change.txid {
                    let _ = write!(line, "\t{}", txid);
                }
            }
        }
        line.push('\n');
        out.write_all(line.as_bytes())?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

/// A reported rank of an old balance.
#[derive(Debug, Serialize)]
pub struct BalanceRank<'a> {
    pub change: i64,
    pub old: i64,
    #[serde(skip_serializing_if = "no_ranks")]
    pub ranks: &'a [f64],
    pub count: u64,
    pub norm_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<u64>,
    #[serde(skip)]
    pub record: u64,
}

fn no_ranks(ranks: &&[f64]) -> bool {
    ranks.is_empty()
}

/// Destination for balance ranks.
pub trait BalanceSink {
    fn record(&mut self, rank: &BalanceRank<'_>) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Write any trailing output, then flush.
    fn finish(&mut self) -> Result<()> {
        self.flush()
    }
}

/// One line per rank on a single writer. TSV lines are
/// `change old rank_0 .. rank_{M-1} [txid]` for weighted runs and
/// `change old count norm_count [txid]` otherwise.
pub struct BalanceLineSink<W: Write> {
    out: W,
    format: OutputFormat,
    weighted: bool,
    line: String,
}

impl<W: Write> BalanceLineSink<W> {
    pub fn new(out: W, format: OutputFormat, weighted: bool) -> Self {
        BalanceLineSink {
            out,
            format,
            weighted,
            line: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> BalanceSink for BalanceLineSink<W> {
    fn record(&mut self, rank: &BalanceRank<'_>) -> Result<()> {
        if self.format == OutputFormat::Jsonl {
            let mut line = serde_json::to_vec(rank)?;
            line.push(b'\n');
            self.out.write_all(&line)?;
            return Ok(());
        }
        self.line.clear();
        let _ = write!(self.line, "{}\t{}", rank.change, rank.old);
        if self.weighted {
            for r in rank.ranks {
                let _ = write!(self.line, "\t{}", r);
            }
        } else {
            let _ = write!(self.line, "\t{}\t{}", rank.count, rank.norm_count);
        }
        if let Some(txid) = rank.txid {
            let _ = write!(self.line, "\t{}", txid);
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

/// `<base>-<exponent:.2>.dat`
pub fn balance_split_path(base: &Path, exponent: f64) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("-{:.2}.dat", exponent));
    PathBuf::from(name)
}

fn create_balance_writers(base: &Path, exponents: &[f64]) -> Result<Vec<BufWriter<File>>> {
    exponents
        .iter()
        .map(|&a| {
            let path = balance_split_path(base, a);
            File::create(&path).map(BufWriter::new).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("{}: {}", path.display(), e),
                ))
            })
        })
        .collect()
}

/// One file per exponent with `change old rank [txid]` lines.
pub struct BalanceSplitSink<W: Write> {
    writers: Vec<W>,
}

impl BalanceSplitSink<BufWriter<File>> {
    pub fn create(base: &Path, exponents: &[f64]) -> Result<Self> {
        Ok(BalanceSplitSink {
            writers: create_balance_writers(base, exponents)?,
        })
    }
}

impl<W: Write> BalanceSplitSink<W> {
    pub fn from_writers(writers: Vec<W>) -> Self {
        BalanceSplitSink { writers }
    }

    pub fn into_writers(self) -> Vec<W> {
        self.writers
    }
}

impl<W: Write> BalanceSink for BalanceSplitSink<W> {
    fn record(&mut self, rank: &BalanceRank<'_>) -> Result<()> {
        for (out, r) in self.writers.iter_mut().zip(rank.ranks) {
            match rank.txid {
                Some(txid) => writeln!(out, "{}\t{}\t{}\t{}", rank.change, rank.old, r, txid)?,
                None => writeln!(out, "{}\t{}\t{}", rank.change, rank.old, r)?,
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for w in &mut self.writers {
            w.flush()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct ValueBins {
    counts: Vec<u64>,
    values: Vec<u64>,
    count_total: u64,
    value_total: u64,
}

/// Binned balance ranks, one file per exponent.
///
/// Besides how many ranks fall into each bin, every bin also sums the
/// credited amounts, so a file has one
/// `bin_lo count count_total value value_total` line per bin, written once
/// at the end.
pub struct BalanceHistogramSink<W: Write> {
    writers: Vec<W>,
    bins: Vec<ValueBins>,
    bin_width: f64,
    finished: bool,
}

impl BalanceHistogramSink<BufWriter<File>> {
    pub fn create(base: &Path, exponents: &[f64], bin_width: f64) -> Result<Self> {
        Ok(Self::from_writers(
            create_balance_writers(base, exponents)?,
            bin_width,
        ))
    }
}

impl<W: Write> BalanceHistogramSink<W> {
    /// `bin_width` must lie in `(0, 1]`.
    pub fn from_writers(writers: Vec<W>, bin_width: f64) -> Self {
        let nbins = bin_count(bin_width);
        let empty = ValueBins {
            counts: vec![0; nbins],
            values: vec![0; nbins],
            ..ValueBins::default()
        };
        BalanceHistogramSink {
            bins: vec![empty; writers.len()],
            writers,
            bin_width,
            finished: false,
        }
    }

    pub fn into_writers(self) -> Vec<W> {
        self.writers
    }
}

impl<W: Write> BalanceSink for BalanceHistogramSink<W> {
    fn record(&mut self, rank: &BalanceRank<'_>) -> Result<()> {
        let amount = u64::try_from(rank.change).map_err(|_| {
            Error::InconsistentData(format!("negative credit {} reached a histogram", rank.change))
        })?;
        let overflow = || Error::Overflow {
            position: Position::new(rank.record),
        };
        for (bins, &r) in self.bins.iter_mut().zip(rank.ranks) {
            let b = bin_index(r, self.bin_width, bins.counts.len())?;
            bins.value_total = bins.value_total.checked_add(amount).ok_or_else(overflow)?;
            bins.values[b] += amount;
            bins.counts[b] += 1;
            bins.count_total += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.finished {
            self.finished = true;
            for (out, bins) in self.writers.iter_mut().zip(&self.bins) {
                for (j, (count, value)) in bins.counts.iter().zip(&bins.values).enumerate() {
                    writeln!(
                        out,
                        "{:.6}\t{}\t{}\t{}\t{}",
                        self.bin_width * j as f64,
                        count,
                        bins.count_total,
                        value,
                        bins.value_total
                    )?;
                }
            }
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        for w in &mut self.writers {
            w.flush()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceStats {
    pub records: u64,
    pub ranked: u64,
    /// Balances currently in the distribution.
    pub tracked: u64,
}

pub struct BalanceReplay {
    index: Box<dyn RankIndex<i64>>,
    threshold: i64,
    /// Sorted.
    exclude: Vec<i64>,
    sample: RankSample,
    stats: BalanceStats,
}

impl BalanceReplay {
    pub fn new(index: Box<dyn RankIndex<i64>>, threshold: i64, mut exclude: Vec<i64>) -> Result<Self> {
        if threshold < 0 {
            return Err(Error::Config(format!(
                "balance threshold must be >= 0, got {}",
                threshold
            )));
        }
        exclude.sort_unstable();
        exclude.dedup();
        let sample = RankSample::zeroed(index.width());
        Ok(BalanceReplay {
            index,
            threshold,
            exclude,
            sample,
            stats: BalanceStats::default(),
        })
    }

    pub fn stats(&self) -> &BalanceStats {
        &self.stats
    }

    fn tracks(&self, balance: i64) -> bool {
        balance > self.threshold && self.exclude.binary_search(&balance).is_err()
    }

    pub fn apply(&mut self, change: &BalanceChange, sink: &mut dyn BalanceSink) -> Result<()> {
        self.stats.records += 1;
        if self.tracks(change.old) {
            if change.credit && change.new >= change.old {
                let diff = change.new.checked_sub(change.old).ok_or_else(|| Error::Overflow {
                    position: Position::new(change.record),
                })?;
                self.index.rank(change.old, &mut self.sample)?;
                sink.record(&BalanceRank {
                    change: diff,
                    old: change.old,
                    ranks: &self.sample.weighted,
                    count: self.sample.count,
                    norm_count: self.sample.norm_count,
                    txid: change.txid,
                    record: change.record,
                })?;
                self.stats.ranked += 1;
            }
            self.index.remove(change.old)?;
        }
        if self.tracks(change.new) {
            self.index.add(change.new)?;
        }
        self.stats.tracked = self.index.len();
        Ok(())
    }
}

/// Replay every balance change of `source`.
pub fn run_balances(
    replay: &mut BalanceReplay,
    source: &mut dyn BalanceSource,
    sink: &mut dyn BalanceSink,
    progress_every: u64,
    ctx: &LogContext,
) -> Result<BalanceStats> {
    let started = Instant::now();
    let mut next_progress = progress_every;
    while let Some(change) = source.next_change()? {
        replay.apply(&change, sink)?;
        let stats = replay.stats();
        if progress_every > 0 && stats.records >= next_progress {
            next_progress += progress_every;
            log_event!(
                ctx,
                INFO,
                event_names::REPLAY_PROGRESS,
                Stage::Replay,
                "balance changes replayed",
                records = stats.records,
                ranked = stats.ranked,
                tracked = stats.tracked
            );
        }
    }
    let stats = replay.stats().clone();
    log_event!(
        ctx,
        INFO,
        event_names::REPLAY_FINISHED,
        Stage::Replay,
        "balance changes replayed",
        records = stats.records,
        ranked = stats.ranked,
        tracked = stats.tracked,
        elapsed_ms = started.elapsed().as_millis() as u64
    );
    Ok(stats)
}
