//! Tree error types.

use thiserror::Error;

/// Errors raised by the aggregate tree and the rank index facade.
///
/// Keys are carried as rendered strings so the error type stays independent
/// of the key type parameter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("key {key} not found during {operation}")]
    KeyNotFound { key: String, operation: &'static str },

    #[error("stale handle to node slot {index} used during {operation}")]
    StaleHandle { index: usize, operation: &'static str },

    #[error("node arena capacity exhausted (limit {limit})")]
    CapacityExhausted { limit: u64 },

    #[error("key {key} is not positive and cannot be stored")]
    NonPositiveKey { key: String },

    #[error("zero multiplicity passed to {operation}")]
    ZeroMultiplicity { operation: &'static str },

    #[error("weighted norm is zero while key {key} is present")]
    DegenerateNorm { key: String },

    #[error("weighted norm for exponent {exponent} is not finite at key {key}")]
    NormOverflow { key: String, exponent: f64 },
}

impl From<TreeError> for pa_common::Error {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::KeyNotFound { key, operation } => {
                pa_common::Error::KeyNotFound { key, operation }
            }
            TreeError::StaleHandle { index, operation } => pa_common::Error::KeyNotFound {
                key: format!("<stale handle {}>", index),
                operation,
            },
            TreeError::CapacityExhausted { limit } => pa_common::Error::ResourceExhausted {
                resource: "tree node arena",
                limit,
            },
            TreeError::NormOverflow { key, exponent } => pa_common::Error::Config(format!(
                "weighted norm for exponent {} overflows at key {}; lower the exponent",
                exponent, key
            )),
            other => pa_common::Error::InconsistentData(other.to_string()),
        }
    }
}
