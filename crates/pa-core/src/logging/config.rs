//! Log level and format resolution.
//!
//! Sources, strongest first: `-q`/`-v`/`--log-format`, `PA_LOG` and
//! `PA_LOG_FORMAT`, a coarse reading of `RUST_LOG`, then the defaults
//! (info, human).

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::filter::LevelFilter;

/// Encoding of log lines on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// fmt layer, ANSI colours only on a terminal
    #[default]
    #[value(alias = "console", alias = "pretty")]
    Human,
    /// One JSON object per line
    #[value(alias = "json")]
    Jsonl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[value(alias = "warning")]
    Warn,
    Error,
    #[value(alias = "quiet", alias = "none")]
    Off,
}

impl LogLevel {
    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }

    /// Most verbose level named anywhere in a `RUST_LOG` directive string.
    fn sniff(directives: &str) -> Option<Self> {
        [LogLevel::Trace, LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error]
            .into_iter()
            .find(|level| directives.contains(&level.to_string()))
    }
}

fn write_value_name<T: ValueEnum>(value: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.to_possible_value() {
        Some(v) => f.write_str(v.get_name()),
        None => Ok(()),
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value_name(self, f)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value_name(self, f)
    }
}

/// Raw logging-related environment, captured once.
#[derive(Debug, Clone, Default)]
pub struct LogEnv {
    pub pa_log: Option<String>,
    pub rust_log: Option<String>,
    pub pa_log_format: Option<String>,
}

impl LogEnv {
    pub fn capture() -> Self {
        LogEnv {
            pa_log: std::env::var("PA_LOG").ok(),
            rust_log: std::env::var("RUST_LOG").ok(),
            pa_log_format: std::env::var("PA_LOG_FORMAT").ok(),
        }
    }

    fn level(&self) -> Option<LogLevel> {
        match (&self.pa_log, &self.rust_log) {
            (Some(v), _) => LogLevel::from_str(v.trim(), true).ok(),
            (None, Some(v)) => LogLevel::sniff(&v.to_ascii_lowercase()),
            (None, None) => None,
        }
    }

    fn format(&self) -> Option<LogFormat> {
        self.pa_log_format
            .as_deref()
            .and_then(|v| LogFormat::from_str(v.trim(), true).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl LogConfig {
    /// Resolve against the process environment.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::resolve(&LogEnv::capture(), cli_level, cli_format)
    }

    /// Unparseable environment values are ignored.
    pub fn resolve(env: &LogEnv, cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        LogConfig {
            level: cli_level.or_else(|| env.level()).unwrap_or_default(),
            format: cli_format.or_else(|| env.format()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pa_log: Option<&str>, rust_log: Option<&str>, format: Option<&str>) -> LogEnv {
        LogEnv {
            pa_log: pa_log.map(String::from),
            rust_log: rust_log.map(String::from),
            pa_log_format: format.map(String::from),
        }
    }

    #[test]
    fn test_names_and_aliases() {
        assert_eq!(LogFormat::from_str("JSON", true), Ok(LogFormat::Jsonl));
        assert_eq!(LogLevel::from_str("warning", true), Ok(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("quiet", true), Ok(LogLevel::Off));
        assert!(LogFormat::from_str("yaml", true).is_err());
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogFormat::Jsonl.to_string(), "jsonl");
    }

    #[test]
    fn test_pa_log_beats_rust_log() {
        let c = LogConfig::resolve(&env(Some("debug"), Some("trace"), None), None, None);
        assert_eq!(c.level, LogLevel::Debug);
    }

    #[test]
    fn test_rust_log_is_sniffed() {
        let c = LogConfig::resolve(&env(None, Some("pa_core=WARN"), Some("jsonl")), None, None);
        assert_eq!(c.level, LogLevel::Warn);
        assert_eq!(c.format, LogFormat::Jsonl);

        let c = LogConfig::resolve(&env(None, Some("pa_tree=error,pa_core=trace"), None), None, None);
        assert_eq!(c.level, LogLevel::Trace);
    }

    #[test]
    fn test_cli_wins_and_garbage_is_ignored() {
        let c = LogConfig::resolve(
            &env(Some("loud"), None, Some("xml")),
            Some(LogLevel::Error),
            None,
        );
        assert_eq!(c.level, LogLevel::Error);
        assert_eq!(c.format, LogFormat::Human);

        let c = LogConfig::resolve(&env(Some("loud"), None, None), None, Some(LogFormat::Jsonl));
        assert_eq!(c, LogConfig { level: LogLevel::Info, format: LogFormat::Jsonl });
    }

    #[test]
    fn test_level_filters() {
        assert_eq!(LogLevel::Off.filter(), LevelFilter::OFF);
        assert_eq!(LogLevel::default().filter(), LevelFilter::INFO);
    }
}
