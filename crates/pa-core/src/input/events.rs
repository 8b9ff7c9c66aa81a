//! Event log reader.
//!
//! Reads the `kind degree timestamp [contract]` lines written by
//! `patest generate`.

use super::reader::{TableError, TableReader};
use pa_common::{Error, EventKind, EventRecord, Result};
use std::io::BufRead;

pub struct EventLogReader<R> {
    table: TableReader<R>,
}

impl<R: BufRead> EventLogReader<R> {
    pub fn new(table: TableReader<R>) -> Self {
        EventLogReader { table }
    }

    /// Record number of the last event returned.
    pub fn record(&self) -> u64 {
        self.table.line_number()
    }

    /// Next event, or `Ok(None)` at end of input.
    pub fn next_event(&mut self) -> Result<Option<EventRecord>> {
        if !self.table.read_line() {
            return match self.table.last_error() {
                TableError::Eof => Ok(None),
                _ => Err(self.table.error()),
            };
        }
        let (Some(code), Some(degree), Some(timestamp)) = (
            self.table.read_u32(),
            self.table.read_u32(),
            self.table.read_u32(),
        ) else {
            return Err(self.table.error());
        };
        let kind = EventKind::from_code(code).ok_or_else(|| Error::Format {
            position: self.table.position().with_field(1),
            detail: format!("unknown event kind {}", code),
        })?;
        let mut record = EventRecord::new(kind, degree, timestamp);
        if self.table.has_more_fields() {
            let Some(flag) = self.table.read_u32() else {
                return Err(self.table.error());
            };
            let flag = u8::try_from(flag).map_err(|_| Error::Overflow {
                position: self.table.position(),
            })?;
            record.contract = Some(flag);
        }
        Ok(Some(record))
    }
}
