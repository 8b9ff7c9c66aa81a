//! Binned rank output.
//!
//! Instead of one line per rank, each `(exponent, kind)` file receives a
//! histogram of ranks over `[0, 1]`: one `bin_lo\tcount\ttotal` line per bin.
//! With a flush period, histograms are written and reset every `every`
//! seconds of stream time and each line is prefixed with the period
//! boundary.

use super::split::create_writers;
use super::EventSink;
use pa_common::{Error, EventKind, EventRecord, RankSample, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct HistogramSink<W: Write> {
    writers: Vec<W>,
    bins: Vec<Vec<u64>>,
    totals: Vec<u64>,
    bin_width: f64,
    every: u32,
    next_flush: u32,
    seen: bool,
    finished: bool,
}

impl HistogramSink<BufWriter<File>> {
    pub fn create(base: &Path, exponents: &[f64], bin_width: f64, every: u32) -> Result<Self> {
        Ok(Self::from_writers(
            create_writers(base, exponents)?,
            bin_width,
            every,
        ))
    }
}

impl<W: Write> HistogramSink<W> {
    /// `bin_width` must lie in `(0, 1]`; `every == 0` disables periodic
    /// flushing.
    pub fn from_writers(writers: Vec<W>, bin_width: f64, every: u32) -> Self {
        let nbins = bin_count(bin_width);
        let n = writers.len();
        HistogramSink {
            writers,
            bins: vec![vec![0; nbins]; n],
            totals: vec![0; n],
            bin_width,
            every,
            next_flush: 0,
            seen: false,
            finished: false,
        }
    }

    pub fn nbins(&self) -> usize {
        self.bins.first().map_or(0, Vec::len)
    }

    pub fn into_writers(self) -> Vec<W> {
        self.writers
    }

    fn write_all(&mut self, boundary: Option<u32>) -> Result<()> {
        for ((out, bins), total) in self
            .writers
            .iter_mut()
            .zip(self.bins.iter_mut())
            .zip(self.totals.iter_mut())
        {
            for (j, count) in bins.iter_mut().enumerate() {
                if let Some(ts) = boundary {
                    write!(out, "{}\t", ts)?;
                }
                writeln!(out, "{:.6}\t{}\t{}", self.bin_width * j as f64, count, total)?;
                *count = 0;
            }
            *total = 0;
        }
        Ok(())
    }

    fn bin_of(&self, rank: f64) -> Result<usize> {
        bin_index(rank, self.bin_width, self.nbins())
    }
}

/// Number of bins of width `bin_width` covering `[0, 1]`.
pub fn bin_count(bin_width: f64) -> usize {
    (1.0 / bin_width).ceil().max(1.0) as usize
}

/// Bin of a normalized rank. A rank of exactly 1.0 belongs to the last bin.
pub fn bin_index(rank: f64, bin_width: f64, nbins: usize) -> Result<usize> {
    if !(0.0..=1.0).contains(&rank) {
        return Err(Error::InconsistentData(format!(
            "rank {} outside [0, 1]",
            rank
        )));
    }
    Ok(((rank / bin_width).floor() as usize).min(nbins.saturating_sub(1)))
}

impl<W: Write> EventSink for HistogramSink<W> {
    fn wants_bookkeeping(&self) -> bool {
        self.every > 0
    }

    fn record(&mut self, event: &EventRecord, rank: Option<&RankSample>) -> Result<()> {
        if self.every > 0 {
            let ts = event.timestamp;
            if self.next_flush == 0 {
                self.next_flush = ts.saturating_add(self.every);
            }
            if ts >= self.next_flush {
                self.write_all(Some(self.next_flush))?;
                while self.next_flush <= ts {
                    match self.next_flush.checked_add(self.every) {
                        Some(next) => self.next_flush = next,
                        None => {
                            self.next_flush = u32::MAX;
                            break;
                        }
                    }
                }
            }
        }
        self.seen = true;

        let (Some(slot), Some(rank)) = (event.kind.classification_slot(), rank) else {
            return Ok(());
        };
        let kinds = EventKind::CLASSIFICATIONS.len();
        for (i, &r) in rank.weighted.iter().enumerate() {
            let b = self.bin_of(r)?;
            let idx = i * kinds + slot;
            let bins = self.bins.get_mut(idx).ok_or_else(|| {
                Error::InconsistentData(format!("no histogram for exponent slot {}", i))
            })?;
            bins[b] += 1;
            self.totals[idx] += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.finished {
            self.finished = true;
            if self.every == 0 {
                self.write_all(None)?;
            } else if self.seen {
                self.write_all(Some(self.next_flush))?;
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
