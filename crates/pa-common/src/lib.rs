//! Shared types for preferential-attachment stream analysis.
//!
//! This crate provides foundational types shared across the workspace:
//! - The fatal error taxonomy and its stable codes
//! - Event kinds and event records emitted per processed edge
//! - Rank samples attached to classification events
//! - Output formats

pub mod error;
pub mod event;
pub mod output;

pub use error::{Error, ErrorCategory, Position, Result};
pub use event::{EventKind, EventRecord, RankSample};
pub use output::OutputFormat;
