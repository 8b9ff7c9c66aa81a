//! Structured event vocabulary for logging.
//!
//! Every log line carries the run's correlation id and the pipeline stage
//! that produced it.

use serde::{Deserialize, Serialize};

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Argument parsing and configuration.
    Init,
    /// Reading id and link tables.
    Load,
    /// Edge stream processing.
    Stream,
    /// Rank or balance replay from an event log.
    Replay,
    /// Flushing sinks.
    Output,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Stream => "stream",
            Stage::Replay => "replay",
            Stage::Output => "output",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const RUN_FAILED: &str = "run.failed";

    // Config/load
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const IDS_LOADED: &str = "load.ids";
    pub const LINKS_LOADED: &str = "load.links";

    // Stream stage
    pub const STREAM_PROGRESS: &str = "stream.progress";
    pub const STREAM_FINISHED: &str = "stream.finished";

    // Replay stage
    pub const REPLAY_PROGRESS: &str = "replay.progress";
    pub const REPLAY_FINISHED: &str = "replay.finished";

    // Output stage
    pub const OUTPUT_FLUSHED: &str = "output.flushed";
    pub const SNAPSHOT_WRITTEN: &str = "output.snapshot";
}

/// Correlation context shared by every log line of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
        }
    }
}
