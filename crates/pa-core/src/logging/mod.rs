//! Structured logging for patest.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for batch pipelines
//!
//! # Usage
//!
//! ```ignore
//! use pa_core::logging::{init_logging, LogConfig, LogContext, Stage, event_names};
//!
//! let config = LogConfig::from_env(None, None);
//! init_logging(&config);
//!
//! let ctx = LogContext::new(generate_run_id());
//! pa_core::log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Init, "starting");
//! ```
//!
//! stdout is reserved for event and rank payloads; every log line goes to
//! stderr.

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogEnv, LogFormat, LogLevel};
pub use events::{event_names, LogContext, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events pass the level-derived filter.
const LOG_TARGETS: [&str; 4] = ["patest", "pa_core", "pa_tree", "pa_heap"];

fn default_filter(level: LogLevel) -> EnvFilter {
    let level = level.filter();
    LOG_TARGETS
        .iter()
        .fold(EnvFilter::default(), |filter, target| {
            match format!("{}={}", target, level).parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => filter,
            }
        })
}

/// Install the global subscriber. Call once, before the first event.
///
/// A set `RUST_LOG` replaces the level-derived filter entirely.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level));
    let human = (config.format == LogFormat::Human).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(std::io::stderr().is_terminal())
    });
    let jsonl = (config.format == LogFormat::Jsonl).then(JsonlLayer::stderr);
    // A second call (e.g. from an embedding program) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(human)
        .with(jsonl)
        .try_init();
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    // First 12 hex chars are enough to correlate one run's lines
    format!("run-{}", &uuid.simple().to_string()[..12])
}

/// Structured event logging with run context.
///
/// ```ignore
/// log_event!(ctx, INFO, event_names::STREAM_PROGRESS, Stage::Stream, "progress",
///     records = 100_000u64, rank_queries = 99_120u64);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::info!(
            event = $event,
            run_id = %$ctx.run_id,
            stage = %$stage,
            $($key = $val,)*
            message = $msg,
        )
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::debug!(
            event = $event,
            run_id = %$ctx.run_id,
            stage = %$stage,
            $($key = $val,)*
            message = $msg,
        )
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::warn!(
            event = $event,
            run_id = %$ctx.run_id,
            stage = %$stage,
            $($key = $val,)*
            message = $msg,
        )
    };
    ($ctx:expr, ERROR, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::error!(
            event = $event,
            run_id = %$ctx.run_id,
            stage = %$stage,
            $($key = $val,)*
            message = $msg,
        )
    };
}
