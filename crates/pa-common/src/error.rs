//! Error types for preferential-attachment stream analysis.
//!
//! Every error in this taxonomy is fatal for the run that raised it: partial
//! statistics computed over a stream whose invariants were broken are worse
//! than no statistics at all. The types still carry:
//! - Stable error codes for machine parsing
//! - Category classification for exit-code mapping
//! - Remediation hints for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! error[21] unsorted_input: timestamp 1400 is older than 1500 (edges.tsv, record 812)
//!   Fix: sort the edge stream by timestamp before running the analysis
//! ```
//!
//! End of input is not an error; readers report it as `Ok(None)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for stream analysis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or out-of-range input fields.
    Input,
    /// Input stream violates the time-ordering contract.
    Ordering,
    /// Internal state disagrees with itself (logic or data-consistency bug).
    Consistency,
    /// A growable structure hit its capacity bound or could not allocate.
    Resource,
    /// Invalid configuration or arguments.
    Config,
    /// File I/O and serialization errors.
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Ordering => write!(f, "ordering"),
            ErrorCategory::Consistency => write!(f, "consistency"),
            ErrorCategory::Resource => write!(f, "resource"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Location of a record in an input stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Name of the input (file name or `<stdin>`), if known.
    pub source: Option<String>,
    /// 1-based record (line) number.
    pub record: u64,
    /// 1-based field number within the record, if the error is field-specific.
    pub field: Option<usize>,
}

impl Position {
    pub fn new(record: u64) -> Self {
        Self {
            source: None,
            record,
            field: None,
        }
    }

    pub fn with_field(mut self, field: usize) -> Self {
        self.field = Some(field);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}, ", source)?;
        }
        write!(f, "record {}", self.record)?;
        if let Some(field) = self.field {
            write!(f, ", field {}", field)?;
        }
        Ok(())
    }
}

/// Unified error type for stream analysis.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (10-19)
    #[error("malformed input ({position}): {detail}")]
    Format { position: Position, detail: String },

    #[error("numeric field out of range ({position})")]
    Overflow { position: Position },

    // Ordering errors (20-29)
    #[error("timestamp {timestamp} is older than {previous} ({position})")]
    UnsortedInput {
        position: Position,
        timestamp: u32,
        previous: u32,
    },

    // Consistency errors (30-39)
    #[error("key {key} not found during {operation}")]
    KeyNotFound { key: String, operation: &'static str },

    #[error("inconsistent data: {0}")]
    InconsistentData(String),

    // Resource errors (40-49)
    #[error("{resource} exhausted (limit {limit})")]
    ResourceExhausted { resource: &'static str, limit: u64 },

    // Configuration errors (50-59)
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Input errors
    /// - 20-29: Ordering errors
    /// - 30-39: Consistency errors
    /// - 40-49: Resource errors
    /// - 50-59: Configuration errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Format { .. } => 10,
            Error::Overflow { .. } => 11,
            Error::UnsortedInput { .. } => 21,
            Error::KeyNotFound { .. } => 30,
            Error::InconsistentData(_) => 31,
            Error::ResourceExhausted { .. } => 40,
            Error::Config(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and exit-code mapping.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Format { .. } | Error::Overflow { .. } => ErrorCategory::Input,
            Error::UnsortedInput { .. } => ErrorCategory::Ordering,
            Error::KeyNotFound { .. } | Error::InconsistentData(_) => ErrorCategory::Consistency,
            Error::ResourceExhausted { .. } => ErrorCategory::Resource,
            Error::Config(_) => ErrorCategory::Config,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Short snake_case name of the error kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Format { .. } => "format",
            Error::Overflow { .. } => "overflow",
            Error::UnsortedInput { .. } => "unsorted_input",
            Error::KeyNotFound { .. } => "key_not_found",
            Error::InconsistentData(_) => "inconsistent_data",
            Error::ResourceExhausted { .. } => "resource_exhausted",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }

    /// Input position attached to the error, if any.
    pub fn position(&self) -> Option<&Position> {
        match self {
            Error::Format { position, .. }
            | Error::Overflow { position }
            | Error::UnsortedInput { position, .. } => Some(position),
            _ => None,
        }
    }

    /// Returns true if the error indicates a bug in this program rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::KeyNotFound { .. })
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Format { .. } => {
                "Check the input columns: edge streams are 'source target timestamp', event logs are 'kind degree timestamp'."
            }
            Error::Overflow { .. } => {
                "A numeric field does not fit its type. Node ids and timestamps must be unsigned 32-bit integers."
            }
            Error::UnsortedInput { .. } => {
                "Sort the edge stream by timestamp before running the analysis."
            }
            Error::KeyNotFound { .. } => {
                "The degree distribution lost track of a key. This is a bug; please report it with the input that triggers it."
            }
            Error::InconsistentData(_) => {
                "The input files disagree with each other (ids, links and edge stream). Regenerate them from the same source."
            }
            Error::ResourceExhausted { .. } => {
                "A structure reached its capacity bound. Split the input or reduce the retention window."
            }
            Error::Config(_) => "Run with --help to see valid options, or check the config file.",
            Error::Io(_) => "Check that input files exist and output locations are writable.",
            Error::Json(_) => "Output serialization failed; check the output format setting.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_grouped_by_category() {
        let errors = vec![
            Error::Format {
                position: Position::new(1),
                detail: "bad".into(),
            },
            Error::Overflow {
                position: Position::new(2),
            },
            Error::UnsortedInput {
                position: Position::new(3),
                timestamp: 1,
                previous: 2,
            },
            Error::KeyNotFound {
                key: "7".into(),
                operation: "erase",
            },
            Error::InconsistentData("x".into()),
            Error::ResourceExhausted {
                resource: "eviction heap",
                limit: 10,
            },
            Error::Config("x".into()),
        ];
        for err in errors {
            let code = err.code();
            let expected = match err.category() {
                ErrorCategory::Input => 10..20,
                ErrorCategory::Ordering => 20..30,
                ErrorCategory::Consistency => 30..40,
                ErrorCategory::Resource => 40..50,
                ErrorCategory::Config => 50..60,
                ErrorCategory::Io => 60..70,
            };
            assert!(expected.contains(&code), "{} has code {}", err, code);
        }
    }

    #[test]
    fn test_position_display() {
        let pos = Position::new(812).with_field(3).with_source("edges.tsv");
        assert_eq!(pos.to_string(), "edges.tsv, record 812, field 3");
        assert_eq!(Position::new(5).to_string(), "record 5");
    }

    #[test]
    fn test_unsorted_message_mentions_both_timestamps() {
        let err = Error::UnsortedInput {
            position: Position::new(9),
            timestamp: 1400,
            previous: 1500,
        };
        let msg = err.to_string();
        assert!(msg.contains("1400"));
        assert!(msg.contains("1500"));
        assert!(msg.contains("record 9"));
        assert_eq!(err.kind_name(), "unsorted_input");
    }

    #[test]
    fn test_key_not_found_is_internal() {
        let err = Error::KeyNotFound {
            key: "3".into(),
            operation: "weighted_rank",
        };
        assert!(err.is_internal());
        assert!(err.position().is_none());
        assert!(err.to_string().contains("weighted_rank"));
    }
}
