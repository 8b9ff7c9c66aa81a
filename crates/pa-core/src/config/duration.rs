//! Retention window durations.
//!
//! `<n>` is seconds; `<n>h`, `<n>d`, `<n>w`, `<n>m`, `<n>y` are hours, days,
//! weeks, 30-day months and 365-day years. `0` disables expiry.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const HOUR: u32 = 3_600;
pub const DAY: u32 = 86_400;
pub const WEEK: u32 = 604_800;
pub const MONTH: u32 = 2_592_000;
pub const YEAR: u32 = 31_536_000;

/// Retention window in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Window(pub u32);

impl Window {
    pub const UNBOUNDED: Window = Window(0);

    pub fn seconds(self) -> u32 {
        self.0
    }

    pub fn is_unbounded(self) -> bool {
        self.0 == 0
    }
}

impl Default for Window {
    fn default() -> Self {
        Window(MONTH)
    }
}

/// Parse a duration string into seconds.
pub fn parse_duration(input: &str) -> Result<u32, String> {
    let s = input.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, suffix) = s.split_at(split);
    if digits.is_empty() {
        return Err(format!("invalid duration '{}': expected a number", input));
    }
    let value: u32 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}': number too large", input))?;
    let unit = match suffix {
        "" | "s" => 1,
        "h" => HOUR,
        "d" => DAY,
        "w" => WEEK,
        "m" => MONTH,
        "y" => YEAR,
        other => {
            return Err(format!(
                "invalid duration '{}': unknown unit '{}' (use h, d, w, m or y)",
                input, other
            ))
        }
    };
    value
        .checked_mul(unit)
        .ok_or_else(|| format!("invalid duration '{}': exceeds 32-bit seconds", input))
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Window)
    }
}

impl fmt::Display for Window {
    /// Largest unit that divides the window exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0;
        if secs == 0 {
            return write!(f, "0");
        }
        for (unit, suffix) in [(YEAR, 'y'), (MONTH, 'm'), (WEEK, 'w'), (DAY, 'd'), (HOUR, 'h')] {
            if secs % unit == 0 {
                return write!(f, "{}{}", secs / unit, suffix);
            }
        }
        write!(f, "{}", secs)
    }
}

impl Serialize for Window {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Window {
    /// Accepts either a duration string or a plain number of seconds.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u32),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(n) => Ok(Window(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
