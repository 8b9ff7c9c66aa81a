//! Output formats for stdout payloads.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported encodings for event and rank output on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tab-separated columns, one record per line (default)
    #[default]
    Tsv,

    /// One JSON object per line
    Jsonl,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Tsv => write!(f, "tsv"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tsv" | "text" | "tab" => Ok(OutputFormat::Tsv),
            "jsonl" | "json" => Ok(OutputFormat::Jsonl),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}
