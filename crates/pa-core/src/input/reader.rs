//! Line-oriented reader for whitespace-separated numeric tables.
//!
//! ```ignore
//! let mut r = TableReader::new(stdin.lock());
//! while r.read_line() {
//!     let (Some(a), Some(b)) = (r.read_u32(), r.read_u32()) else {
//!         return Err(r.error());
//!     };
//! }
//! if r.last_error() != TableError::Eof {
//!     return Err(r.error());
//! }
//! ```
//!
//! Every typed read returns `None` on failure and records why in
//! [`TableReader::last_error`]. Reading past the last field of a line is
//! [`TableError::Eol`]; running out of lines is [`TableError::Eof`], which
//! is normal termination.

use pa_common::{Error, Position};
use std::fmt;
use std::io::{self, BufRead};
use std::str::FromStr;

/// State of the last reader operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    Ok,
    /// No more lines.
    Eof,
    /// A field was requested past the end of the line.
    Eol,
    /// A field holds a sign but no digits.
    Missing,
    /// A field is not a number of the requested type.
    Format,
    /// A number does not fit the requested type.
    Overflow,
    /// The underlying reader failed.
    Io,
}

impl TableError {
    pub fn description(self) -> &'static str {
        match self {
            TableError::Ok => "no error",
            TableError::Eof => "end of file",
            TableError::Eol => "unexpected end of line",
            TableError::Missing => "missing value",
            TableError::Format => "invalid number format",
            TableError::Overflow => "value out of range",
            TableError::Io => "read error",
        }
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Whitespace-separated table reader over any buffered input.
pub struct TableReader<R> {
    inner: R,
    source: Option<String>,
    line: String,
    line_no: u64,
    pos: usize,
    field: usize,
    last_error: TableError,
    io_error: Option<io::Error>,
}

impl<R: BufRead> TableReader<R> {
    pub fn new(inner: R) -> Self {
        TableReader {
            inner,
            source: None,
            line: String::new(),
            line_no: 0,
            pos: 0,
            field: 0,
            last_error: TableError::Ok,
            io_error: None,
        }
    }

    /// Name used in error positions (file name or `<stdin>`).
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Advance to the next non-blank line. Returns false at end of input or
    /// on a read error; check [`last_error`](Self::last_error) to tell them apart.
    pub fn read_line(&mut self) -> bool {
        if matches!(self.last_error, TableError::Eof | TableError::Io) {
            return false;
        }
        loop {
            self.line.clear();
            match self.inner.read_line(&mut self.line) {
                Ok(0) => {
                    self.last_error = TableError::Eof;
                    return false;
                }
                Ok(_) => {
                    self.line_no += 1;
                    self.pos = 0;
                    self.field = 0;
                    if !self.line.trim().is_empty() {
                        self.last_error = TableError::Ok;
                        return true;
                    }
                }
                Err(e) => {
                    self.line_no += 1;
                    self.last_error = TableError::Io;
                    self.io_error = Some(e);
                    return false;
                }
            }
        }
    }

    pub fn last_error(&self) -> TableError {
        self.last_error
    }

    /// 1-based number of the current line.
    pub fn line_number(&self) -> u64 {
        self.line_no
    }

    pub fn position(&self) -> Position {
        let mut pos = Position::new(self.line_no);
        if self.field > 0 {
            pos = pos.with_field(self.field);
        }
        if let Some(src) = &self.source {
            pos = pos.with_source(src.clone());
        }
        pos
    }

    /// True if the current line has unread fields.
    pub fn has_more_fields(&self) -> bool {
        !self.line[self.pos..].trim_start().is_empty()
    }

    /// Skip the next field without parsing it.
    pub fn skip_field(&mut self) -> bool {
        self.next_token().is_some()
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_unsigned::<u32>()
    }

    pub fn read_u64(&mut self) -> Option<u64> {
        self.read_unsigned::<u64>()
    }

    pub fn read_i64(&mut self) -> Option<i64> {
        let (start, end) = self.next_token()?;
        let token = &self.line[start..end];
        let err = classify_integer(token, true);
        if err != TableError::Ok {
            self.last_error = err;
            return None;
        }
        self.finish_parse(token.parse::<i64>().ok())
    }

    pub fn read_f64(&mut self) -> Option<f64> {
        let (start, end) = self.next_token()?;
        match self.line[start..end].parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            Ok(_) => {
                self.last_error = TableError::Overflow;
                None
            }
            Err(_) => {
                self.last_error = TableError::Format;
                None
            }
        }
    }

    /// Convert the current failure into a run error with position.
    pub fn error(&mut self) -> Error {
        let position = self.position();
        match self.last_error {
            TableError::Overflow => Error::Overflow { position },
            TableError::Io => Error::Io(
                self.io_error
                    .take()
                    .unwrap_or_else(|| io::Error::other("read failed")),
            ),
            other => Error::Format {
                position,
                detail: other.description().to_string(),
            },
        }
    }

    fn read_unsigned<T: FromStr>(&mut self) -> Option<T> {
        let (start, end) = self.next_token()?;
        let token = &self.line[start..end];
        let err = classify_integer(token, false);
        if err != TableError::Ok {
            self.last_error = err;
            return None;
        }
        let digits = token
            .strip_prefix(|c| c == '+' || c == '-')
            .unwrap_or(token);
        let parsed = digits.parse::<T>().ok();
        self.finish_parse(parsed)
    }

    /// Digits were validated already, so a parse failure is a range error.
    fn finish_parse<T>(&mut self, parsed: Option<T>) -> Option<T> {
        if parsed.is_none() {
            self.last_error = TableError::Overflow;
        }
        parsed
    }

    fn next_token(&mut self) -> Option<(usize, usize)> {
        if self.last_error != TableError::Ok {
            return None;
        }
        let bytes = self.line.as_bytes();
        let mut start = self.pos;
        while start < bytes.len() && bytes[start].is_ascii_whitespace() {
            start += 1;
        }
        self.field += 1;
        if start == bytes.len() {
            self.pos = start;
            self.last_error = TableError::Eol;
            return None;
        }
        let mut end = start;
        while end < bytes.len() && !bytes[end].is_ascii_whitespace() {
            end += 1;
        }
        self.pos = end;
        Some((start, end))
    }
}

/// Shape check of an integer token. A leading minus on an unsigned field is
/// out of range rather than malformed.
fn classify_integer(token: &str, signed: bool) -> TableError {
    let (negative, digits) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };
    if digits.is_empty() {
        return TableError::Missing;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return TableError::Format;
    }
    if negative && !signed && digits.bytes().any(|b| b != b'0') {
        return TableError::Overflow;
    }
    TableError::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> TableReader<Cursor<Vec<u8>>> {
        TableReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_reads_fields_and_skips_blank_lines() {
        let mut r = reader("1 2 3\n\n  \n4\t5 6 extra\n");
        assert!(r.read_line());
        assert_eq!(r.read_u32(), Some(1));
        assert_eq!(r.read_u32(), Some(2));
        assert_eq!(r.read_u32(), Some(3));
        assert!(!r.has_more_fields());
        assert!(r.read_line());
        assert_eq!(r.line_number(), 4);
        assert_eq!(r.read_i64(), Some(4));
        assert!(r.skip_field());
        assert_eq!(r.read_f64(), Some(6.0));
        assert!(r.has_more_fields());
        assert!(!r.read_line());
        assert_eq!(r.last_error(), TableError::Eof);
    }

    #[test]
    fn test_missing_field_is_eol() {
        let mut r = reader("7 8\n");
        assert!(r.read_line());
        r.read_u32();
        r.read_u32();
        assert_eq!(r.read_u32(), None);
        assert_eq!(r.last_error(), TableError::Eol);
        let pos = r.position();
        assert_eq!((pos.record, pos.field), (1, Some(3)));
        assert!(matches!(r.error(), Error::Format { .. }));
    }

    #[test]
    fn test_overflow_and_negative_unsigned() {
        let mut r = reader("4294967296 -1 4294967295\n");
        assert!(r.read_line());
        assert_eq!(r.read_u32(), None);
        assert_eq!(r.last_error(), TableError::Overflow);

        let mut r = reader("-1\n");
        assert!(r.read_line());
        assert_eq!(r.read_u32(), None);
        assert_eq!(r.last_error(), TableError::Overflow);
        assert!(matches!(r.error(), Error::Overflow { .. }));

        let mut r = reader("-1 4294967295\n");
        assert!(r.read_line());
        assert_eq!(r.read_i64(), Some(-1));
        assert_eq!(r.read_u32(), Some(u32::MAX));
    }

    #[test]
    fn test_format_errors() {
        for bad in ["12a", "x", "1.5", "0x10"] {
            let mut r = reader(bad);
            assert!(r.read_line());
            assert_eq!(r.read_u32(), None, "{}", bad);
            assert_eq!(r.last_error(), TableError::Format, "{}", bad);
        }
        let mut r = reader("-\n");
        assert!(r.read_line());
        assert_eq!(r.read_i64(), None);
        assert_eq!(r.last_error(), TableError::Missing);
    }

    #[test]
    fn test_reads_stop_after_error_until_next_line() {
        let mut r = reader("a 1\n2\n");
        assert!(r.read_line());
        assert_eq!(r.read_u32(), None);
        assert_eq!(r.read_u32(), None);
        assert!(r.read_line());
        assert_eq!(r.read_u32(), Some(2));
    }

    #[test]
    fn test_position_carries_source() {
        let mut r = reader("1\n").with_source("edges.tsv");
        assert!(r.read_line());
        assert_eq!(r.position().to_string(), "edges.tsv, record 1");
    }
}
