//! Exit codes for the patest CLI.
//!
//! Exit codes communicate the run outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0: Clean run
//! - 10-19: User/input errors (recoverable by fixing arguments or data)
//! - 20-29: Internal and environment errors

use pa_common::{Error, ErrorCategory};

/// Exit codes for patest runs.
///
/// These codes are a stable contract for scripts driving long analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Success (0)
    // ========================================================================
    /// Input fully processed
    Clean = 0,

    // ========================================================================
    // User / Input Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Invalid or unreadable configuration file
    ConfigError = 11,

    /// Malformed or out-of-range input record
    InputError = 12,

    /// Input violates a data-integrity contract (ordering, id/link tables)
    DataError = 13,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal logic error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// A growable structure reached its capacity bound
    ResourceError = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Check if this exit code is a user/input error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InputError => "ERR_INPUT",
            ExitCode::DataError => "ERR_DATA",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::ResourceError => "ERR_RESOURCE",
        }
    }

    /// Exit code for a fatal run error.
    pub fn from_error(err: &Error) -> Self {
        if err.is_internal() {
            return ExitCode::InternalError;
        }
        match err.category() {
            ErrorCategory::Input => ExitCode::InputError,
            ErrorCategory::Ordering | ErrorCategory::Consistency => ExitCode::DataError,
            ErrorCategory::Resource => ExitCode::ResourceError,
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
