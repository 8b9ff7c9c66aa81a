//! Semantic validation for analysis configuration.
//!
//! Serde checks shape and types; this module checks that the values make
//! sense together (finite exponents, a usable histogram bin width, ...).

use thiserror::Error;

use super::AnalysisConfig;

/// Largest accepted weight exponent. `k^a` for 64-bit balances stays
/// finite up to here; beyond it weighted sums overflow to infinity.
pub const MAX_EXPONENT: f64 = 16.0;

/// Errors found by [`validate_config`].
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("weight exponent #{index} must be finite (got {value})")]
    ExponentNotFinite { index: usize, value: f64 },

    #[error("weight exponent #{index} must be >= 0 (got {value})")]
    ExponentNegative { index: usize, value: f64 },

    #[error("weight exponent #{index} must be <= {max} (got {value})")]
    ExponentTooLarge { index: usize, value: f64, max: f64 },

    #[error("histogram bin width must be in (0, 1] (got {value})")]
    BinWidthRange { value: f64 },

    #[error("heap growth chunk must be positive")]
    HeapChunkZero,

    #[error("split rank output needs at least one weight exponent")]
    SplitWithoutExponents,

    #[error("histogram output needs a split output base")]
    HistogramWithoutSplit,

    #[error("snapshot interval must be positive")]
    SnapshotIntervalZero,
}

/// Validate a fully resolved configuration.
pub fn validate_config(config: &AnalysisConfig) -> Result<(), ValidationError> {
    for (index, &value) in config.exponents.iter().enumerate() {
        if !value.is_finite() {
            return Err(ValidationError::ExponentNotFinite { index, value });
        }
        if value < 0.0 {
            return Err(ValidationError::ExponentNegative { index, value });
        }
        if value > MAX_EXPONENT {
            return Err(ValidationError::ExponentTooLarge {
                index,
                value,
                max: MAX_EXPONENT,
            });
        }
    }

    if let Some(hist) = &config.histogram {
        let w = hist.bin_width;
        if !(w > 0.0 && w <= 1.0) {
            return Err(ValidationError::BinWidthRange { value: w });
        }
        if config.output.split.is_none() {
            return Err(ValidationError::HistogramWithoutSplit);
        }
    }

    if config.heap_chunk == 0 {
        return Err(ValidationError::HeapChunkZero);
    }

    if config.output.split.is_some() && config.exponents.is_empty() {
        return Err(ValidationError::SplitWithoutExponents);
    }

    if config.snapshots.interval.is_unbounded() {
        return Err(ValidationError::SnapshotIntervalZero);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistogramConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&AnalysisConfig::default()), Ok(()));
    }

    #[test]
    fn test_exponents() {
        let mut config = AnalysisConfig {
            exponents: vec![0.5, f64::NAN],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::ExponentNotFinite { index: 1, .. })
        ));
        config.exponents = vec![-1.0];
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::ExponentNegative {
                index: 0,
                value: -1.0
            })
        );
        config.exponents = vec![2.7, 200.0];
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::ExponentTooLarge {
                index: 1,
                value: 200.0,
                max: MAX_EXPONENT
            })
        );
        config.exponents = vec![0.0, MAX_EXPONENT];
        assert_eq!(validate_config(&config), Ok(()));
    }

    fn histogram_config(width: f64) -> AnalysisConfig {
        let mut config = AnalysisConfig {
            exponents: vec![1.0],
            histogram: Some(HistogramConfig {
                bin_width: width,
                ..Default::default()
            }),
            ..Default::default()
        };
        config.output.split = Some("ranks".into());
        config
    }

    #[test]
    fn test_bin_width_bounds() {
        for (width, ok) in [(0.0, false), (0.01, true), (1.0, true), (1.5, false)] {
            let config = histogram_config(width);
            assert_eq!(validate_config(&config).is_ok(), ok, "width {}", width);
        }
    }

    #[test]
    fn test_histogram_and_split_requirements() {
        let mut config = histogram_config(0.5);
        config.output.split = None;
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::HistogramWithoutSplit)
        );

        let mut config = histogram_config(0.5);
        config.exponents.clear();
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::SplitWithoutExponents)
        );
    }

    #[test]
    fn test_heap_chunk_zero() {
        let config = AnalysisConfig {
            heap_chunk: 0,
            ..Default::default()
        };
        assert_eq!(validate_config(&config), Err(ValidationError::HeapChunkZero));
    }

    #[test]
    fn test_snapshot_interval_zero() {
        let mut config = AnalysisConfig::default();
        config.snapshots.interval = crate::config::Window::UNBOUNDED;
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::SnapshotIntervalZero)
        );
    }
}
