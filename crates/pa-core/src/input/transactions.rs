//! Transaction table readers.
//!
//! Output rows are `txid seq address value`, input rows are
//! `txid seq prev_txid prev_seq address value`, both ordered by `txid`.
//! A negative address marks an unidentified party; such rows are skipped
//! and counted. The timestamp table maps `txid timestamp`.

use super::reader::{TableError, TableReader};
use pa_common::{Error, Position, Result};
use std::io::BufRead;

/// Which transaction table a reader consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxSide {
    /// Amounts leaving an address.
    Input,
    /// Amounts arriving at an address.
    Output,
}

/// One identified row of a transaction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRow {
    pub txid: u64,
    pub address: u64,
    pub value: u64,
    /// Line number in its table.
    pub record: u64,
}

pub struct TxTableReader<R> {
    table: TableReader<R>,
    side: TxSide,
    skipped: u64,
}

impl<R: BufRead> TxTableReader<R> {
    pub fn new(table: TableReader<R>, side: TxSide) -> Self {
        TxTableReader {
            table,
            side,
            skipped: 0,
        }
    }

    pub fn side(&self) -> TxSide {
        self.side
    }

    /// Rows dropped for an unidentified address.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Next identified row, or `Ok(None)` at end of input.
    pub fn next_row(&mut self) -> Result<Option<TxRow>> {
        loop {
            if !self.table.read_line() {
                return match self.table.last_error() {
                    TableError::Eof => Ok(None),
                    _ => Err(self.table.error()),
                };
            }
            let Some(txid) = self.table.read_u64() else {
                return Err(self.table.error());
            };
            let skip = match self.side {
                TxSide::Output => 1,
                TxSide::Input => 3,
            };
            for _ in 0..skip {
                if !self.table.skip_field() {
                    return Err(self.table.error());
                }
            }
            let (Some(address), Some(value)) = (self.table.read_i64(), self.table.read_u64()) else {
                return Err(self.table.error());
            };
            let Ok(address) = u64::try_from(address) else {
                self.skipped += 1;
                continue;
            };
            return Ok(Some(TxRow {
                txid,
                address,
                value,
                record: self.table.line_number(),
            }));
        }
    }
}

/// Forward-only lookup of transaction timestamps.
pub struct TxTimeReader<R> {
    table: TableReader<R>,
    current: Option<(u64, u32)>,
}

impl<R: BufRead> TxTimeReader<R> {
    pub fn new(table: TableReader<R>) -> Self {
        TxTimeReader {
            table,
            current: None,
        }
    }

    /// Timestamp of `txid`. Lookups must come in non-decreasing txid order.
    pub fn timestamp_of(&mut self, txid: u64) -> Result<u32> {
        loop {
            match self.current {
                Some((id, ts)) if id == txid => return Ok(ts),
                Some((id, _)) if id > txid => {
                    return Err(Error::InconsistentData(format!(
                        "no timestamp for transaction {} ({})",
                        txid,
                        self.table.position()
                    )))
                }
                _ => {}
            }
            if !self.table.read_line() {
                return match self.table.last_error() {
                    TableError::Eof => Err(Error::InconsistentData(format!(
                        "transaction timestamps end before transaction {}",
                        txid
                    ))),
                    _ => Err(self.table.error()),
                };
            }
            let (Some(id), Some(ts)) = (self.table.read_u64(), self.table.read_u32()) else {
                return Err(self.table.error());
            };
            if let Some((prev, _)) = self.current {
                if id < prev {
                    return Err(Error::Format {
                        position: Position::new(self.table.line_number()),
                        detail: format!("transaction ids out of order ({} after {})", id, prev),
                    });
                }
            }
            self.current = Some((id, ts));
        }
    }
}
