//! Edge stream readers.
//!
//! Text input has one `source target timestamp` record per line. Binary
//! input is a flat array of 12-byte little-endian records with the same
//! three `u32` fields.

use super::reader::{TableError, TableReader};
use pa_common::{Error, Position, Result};
use std::io::{self, BufRead, Read};

/// Size of one binary edge record.
pub const BINARY_RECORD_SIZE: usize = 12;

/// One edge of the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeInput {
    pub source: u32,
    pub target: u32,
    pub timestamp: u32,
    /// 1-based record number in the input, for diagnostics.
    pub record: u64,
}

/// Pull-based stream of edges. `Ok(None)` is end of input.
pub trait EdgeSource {
    fn next_edge(&mut self) -> Result<Option<EdgeInput>>;

    /// Records dropped because a node id did not fit 32 bits.
    fn skipped(&self) -> u64 {
        0
    }
}

/// Text edge reader.
pub struct TextEdgeReader<R> {
    table: TableReader<R>,
    ignore_invalid_ids: bool,
    skipped: u64,
}

impl<R: BufRead> TextEdgeReader<R> {
    pub fn new(table: TableReader<R>, ignore_invalid_ids: bool) -> Self {
        TextEdgeReader {
            table,
            ignore_invalid_ids,
            skipped: 0,
        }
    }
}

impl<R: BufRead> EdgeSource for TextEdgeReader<R> {
    fn next_edge(&mut self) -> Result<Option<EdgeInput>> {
        while self.table.read_line() {
            let ids = (self.table.read_u32(), self.table.read_u32());
            let (Some(source), Some(target)) = ids else {
                if self.ignore_invalid_ids && self.table.last_error() == TableError::Overflow {
                    self.skipped += 1;
                    continue;
                }
                return Err(self.table.error());
            };
            let Some(timestamp) = self.table.read_u32() else {
                return Err(self.table.error());
            };
            return Ok(Some(EdgeInput {
                source,
                target,
                timestamp,
                record: self.table.line_number(),
            }));
        }
        match self.table.last_error() {
            TableError::Eof => Ok(None),
            _ => Err(self.table.error()),
        }
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Binary edge reader.
pub struct BinaryEdgeReader<R> {
    inner: R,
    source: Option<String>,
    record: u64,
}

impl<R: Read> BinaryEdgeReader<R> {
    pub fn new(inner: R) -> Self {
        BinaryEdgeReader {
            inner,
            source: None,
            record: 0,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn position(&self) -> Position {
        let pos = Position::new(self.record);
        match &self.source {
            Some(src) => pos.with_source(src.clone()),
            None => pos,
        }
    }
}

impl<R: Read> EdgeSource for BinaryEdgeReader<R> {
    fn next_edge(&mut self) -> Result<Option<EdgeInput>> {
        let mut buf = [0u8; BINARY_RECORD_SIZE];
        let mut filled = 0;
        while filled < BINARY_RECORD_SIZE {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        self.record += 1;
        if filled < BINARY_RECORD_SIZE {
            return Err(Error::Format {
                position: self.position(),
                detail: format!(
                    "truncated binary record ({} of {} bytes)",
                    filled, BINARY_RECORD_SIZE
                ),
            });
        }
        let field = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Ok(Some(EdgeInput {
            source: field(0),
            target: field(4),
            timestamp: field(8),
            record: self.record,
        }))
    }
}
