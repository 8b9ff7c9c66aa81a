//! Configuration loading and validation.
//!
//! This module handles:
//! - Loading an `AnalysisConfig` from a TOML file
//! - Config resolution order (CLI > `--config` > `PA_CONFIG` > defaults)
//! - Semantic validation (finite exponents, bin width, growth chunk)
//!
//! Example file:
//!
//! ```toml
//! window = "30d"
//! exponents = [0.0, 0.5, 1.0]
//! variant = "map"
//!
//! [histogram]
//! bin_width = 0.001
//! every = "1y"
//!
//! [output]
//! split = "ranks/run1"
//!
//! [snapshots]
//! interval = "1y"
//! ```

pub mod duration;
pub mod validation;

pub use duration::{parse_duration, Window, YEAR};
pub use validation::{validate_config, ValidationError};

use pa_common::OutputFormat;
use pa_heap::DEFAULT_CHUNK;
use pa_tree::{Allocator, TreeVariant};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "PA_CONFIG";

/// Default number of records between progress lines.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100_000;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("invalid TOML in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl From<ConfigError> for pa_common::Error {
    fn from(err: ConfigError) -> Self {
        pa_common::Error::Config(err.to_string())
    }
}

/// Rank histogram settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistogramConfig {
    /// Width of one bin over `[0, 1]`.
    pub bin_width: f64,
    /// Flush interval in stream time; `0` writes once at the end.
    pub every: Window,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        HistogramConfig {
            bin_width: 0.0001,
            every: Window::UNBOUNDED,
        }
    }
}

/// Where event and rank output goes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Encoding of records written to stdout.
    pub format: OutputFormat,
    /// Base path for per-exponent, per-kind rank files
    /// (`<split>-<a>-<kind>.dat`). Stdout is used when unset.
    pub split: Option<PathBuf>,
}

/// Balance replay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BalanceConfig {
    /// Balances at or below this value are not tracked.
    pub threshold: i64,
    /// Balance values that are never tracked.
    pub exclude: Vec<i64>,
    /// Drop addresses whose balance a debit brings back to zero.
    pub forget_zero: bool,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        BalanceConfig {
            threshold: 1,
            exclude: Vec::new(),
            forget_zero: false,
        }
    }
}

/// Distribution snapshot settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Stream time between snapshots.
    pub interval: Window,
    /// First snapshot time; one interval after the first record when unset.
    pub start: Option<u32>,
    /// Reject event logs whose timestamps go backwards.
    pub require_sorted: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            interval: Window(YEAR),
            start: None,
            require_sorted: true,
        }
    }
}

/// Full analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Retention window; `0` keeps every edge active forever.
    pub window: Window,
    /// Weight exponents; empty means plain unweighted rank.
    pub exponents: Vec<f64>,
    pub variant: TreeVariant,
    pub allocator: Allocator,
    /// Reject records whose timestamp is below the previous one.
    pub strict_order: bool,
    /// Skip edge records whose node ids do not fit 32 bits.
    pub ignore_invalid_ids: bool,
    /// Read and emit per-node contract flags.
    pub contracts: bool,
    /// Records between progress log lines; `0` disables them.
    pub progress_every: u64,
    /// Eviction heap growth step, in entries.
    pub heap_chunk: usize,
    pub histogram: Option<HistogramConfig>,
    pub output: OutputConfig,
    pub balances: BalanceConfig,
    pub snapshots: SnapshotConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            window: Window::default(),
            exponents: Vec::new(),
            variant: TreeVariant::default(),
            allocator: Allocator::default(),
            strict_order: true,
            ignore_invalid_ids: true,
            contracts: false,
            progress_every: DEFAULT_PROGRESS_EVERY,
            heap_chunk: DEFAULT_CHUNK,
            histogram: None,
            output: OutputConfig::default(),
            balances: BalanceConfig::default(),
            snapshots: SnapshotConfig::default(),
        }
    }
}

/// Settings given on the command line. `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub window: Option<Window>,
    pub exponents: Option<Vec<f64>>,
    pub variant: Option<TreeVariant>,
    pub allocator: Option<Allocator>,
    pub strict_order: Option<bool>,
    pub ignore_invalid_ids: Option<bool>,
    pub contracts: Option<bool>,
    pub progress_every: Option<u64>,
    pub heap_chunk: Option<usize>,
    pub histogram_bin_width: Option<f64>,
    pub histogram_every: Option<Window>,
    pub output_format: Option<OutputFormat>,
    pub split: Option<PathBuf>,
    pub threshold: Option<i64>,
    pub exclude: Option<Vec<i64>>,
    pub forget_zero: Option<bool>,
    pub snapshot_interval: Option<Window>,
    pub snapshot_start: Option<u32>,
    pub require_sorted: Option<bool>,
}

impl AnalysisConfig {
    /// Apply command-line settings on top of this config.
    pub fn apply(&mut self, o: &ConfigOverrides) {
        if let Some(w) = o.window {
            self.window = w;
        }
        if let Some(e) = &o.exponents {
            self.exponents = e.clone();
        }
        if let Some(v) = o.variant {
            self.variant = v;
        }
        if let Some(a) = o.allocator {
            self.allocator = a;
        }
        if let Some(s) = o.strict_order {
            self.strict_order = s;
        }
        if let Some(i) = o.ignore_invalid_ids {
            self.ignore_invalid_ids = i;
        }
        if let Some(c) = o.contracts {
            self.contracts = c;
        }
        if let Some(p) = o.progress_every {
            self.progress_every = p;
        }
        if let Some(c) = o.heap_chunk {
            self.heap_chunk = c;
        }
        if o.histogram_bin_width.is_some() || o.histogram_every.is_some() {
            let hist = self.histogram.get_or_insert_with(HistogramConfig::default);
            if let Some(w) = o.histogram_bin_width {
                hist.bin_width = w;
            }
            if let Some(e) = o.histogram_every {
                hist.every = e;
            }
        }
        if let Some(f) = o.output_format {
            self.output.format = f;
        }
        if let Some(s) = &o.split {
            self.output.split = Some(s.clone());
        }
        if let Some(t) = o.threshold {
            self.balances.threshold = t;
        }
        if let Some(x) = &o.exclude {
            self.balances.exclude = x.clone();
        }
        if let Some(f) = o.forget_zero {
            self.balances.forget_zero = f;
        }
        if let Some(i) = o.snapshot_interval {
            self.snapshots.interval = i;
        }
        if let Some(s) = o.snapshot_start {
            self.snapshots.start = Some(s);
        }
        if let Some(r) = o.require_sorted {
            self.snapshots.require_sorted = r;
        }
    }
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: AnalysisConfig,
    /// File the config was read from (None if using defaults).
    pub path: Option<PathBuf>,
}

/// Configuration resolution options.
#[derive(Debug, Default)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
    /// Command-line settings applied after the file.
    pub overrides: ConfigOverrides,
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit CLI flags (via `ConfigOptions::overrides`)
/// 2. File named by `--config`
/// 3. File named by `PA_CONFIG`
/// 4. Built-in defaults
///
/// The result is validated after overrides are applied.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    let path = options
        .config_path
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    let mut config = match &path {
        Some(p) => load_config_file(p)?,
        None => AnalysisConfig::default(),
    };
    config.apply(&options.overrides);
    validate_config(&config)?;

    Ok(ResolvedConfig { config, path })
}

/// Parse a config file without applying overrides or validation.
pub fn load_config_file(path: &Path) -> Result<AnalysisConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::IoError {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.window.seconds(), 2_592_000);
        assert!(config.exponents.is_empty());
        assert!(config.strict_order);
        assert!(config.ignore_invalid_ids);
        assert_eq!(config.balances.threshold, 1);
        assert!(!config.balances.forget_zero);
        assert_eq!(config.snapshots.interval.seconds(), 31_536_000);
        assert!(config.snapshots.require_sorted);
        assert_eq!(config.progress_every, 100_000);
    }

    #[test]
    fn test_file_then_overrides() {
        let file = write_config(
            r#"
window = "2w"
exponents = [0.0, 1.0]
variant = "map"
allocator = "boxed"

[histogram]
bin_width = 0.1
every = 86400

[output]
format = "jsonl"

[snapshots]
interval = "1w"
start = 1000
"#,
        );
        let options = ConfigOptions {
            config_path: Some(file.path().to_path_buf()),
            overrides: ConfigOverrides {
                window: Some(Window(20)),
                require_sorted: Some(false),
                ..Default::default()
            },
        };
        let resolved = load_config(&options).unwrap();
        let c = resolved.config;
        assert_eq!(resolved.path.as_deref(), Some(file.path()));
        assert_eq!(c.window, Window(20));
        assert_eq!(c.exponents, vec![0.0, 1.0]);
        assert_eq!(c.variant, TreeVariant::Map);
        assert_eq!(c.allocator, Allocator::Boxed);
        assert_eq!(c.output.format, OutputFormat::Jsonl);
        let hist = c.histogram.unwrap();
        assert_eq!(hist.bin_width, 0.1);
        assert_eq!(hist.every, Window(86_400));
        assert_eq!(c.snapshots.interval, Window(604_800));
        assert_eq!(c.snapshots.start, Some(1000));
        assert!(!c.snapshots.require_sorted);
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let file = write_config("windw = \"1d\"\n");
        let err = load_config_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config_file(Path::new("/nonexistent/pa.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let file = write_config("exponents = [1.0]\noutput = { split = \"r\" }\n");
        let options = ConfigOptions {
            config_path: Some(file.path().to_path_buf()),
            overrides: ConfigOverrides {
                histogram_bin_width: Some(2.0),
                ..Default::default()
            },
        };
        let err = load_config(&options).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError(ValidationError::BinWidthRange { .. })
        ));
    }
}
