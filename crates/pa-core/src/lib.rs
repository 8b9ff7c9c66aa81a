//! Preferential-attachment stream analysis.
//!
//! This library holds everything above the tree and heap crates:
//! - Exit codes for CLI runs
//! - Configuration loading and validation
//! - Structured logging
//! - Input readers (edge streams, ids, links, event logs, transaction tables)
//! - The edge stream processor
//! - Event sinks
//! - Rank replay over event logs and balance replay over balance changes
//! - Degree and balance distribution snapshots
//!
//! The binary entry point is in `main.rs`.

pub mod balances;
pub mod config;
pub mod exit_codes;
pub mod input;
pub mod logging;
pub mod replay;
pub mod sink;
pub mod snapshot;
pub mod stream;
