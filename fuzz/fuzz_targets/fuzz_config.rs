//! Fuzz target for configuration files and duration strings.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pa_core::config::{parse_duration, validate_config, AnalysisConfig};

fuzz_target!(|data: &str| {
    let _ = parse_duration(data);
    if let Ok(config) = toml::from_str::<AnalysisConfig>(data) {
        let _ = validate_config(&config);
    }
});
