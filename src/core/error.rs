//! Error handling for histgbm.
//!
//! All fatal paths in the crate flow through [`HistGbmError`] so that the
//! caller sees a single human-readable line naming the contract that
//! failed: which file, which column, which size.

use std::io;
use thiserror::Error;

/// Main error type for the histgbm library.
#[derive(Error, Debug)]
pub enum HistGbmError {
    /// Configuration errors: bad column reference, out-of-range parameter,
    /// unsupported option combination.
    #[error("Config error: {message}")]
    Config { message: String },

    /// File cannot be opened / read / written.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Binary dataset file header or section size mismatch.
    #[error("Binary format error: {message}")]
    IoFormat { message: String },

    /// A text row does not match the recognized format.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Structural inconsistency: query id out of range, empty dataset,
    /// empty usable-feature set.
    #[error("Consistency error: {message}")]
    Consistency { message: String },

    /// Bind/connect failure after retries, or a collective timeout.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}, {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
}

impl HistGbmError {
    /// Create a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        HistGbmError::Config {
            message: message.into(),
        }
    }

    /// Create a binary-format error.
    pub fn io_format<S: Into<String>>(message: S) -> Self {
        HistGbmError::IoFormat {
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse<S: Into<String>>(message: S) -> Self {
        HistGbmError::Parse {
            message: message.into(),
        }
    }

    /// Create a consistency error.
    pub fn consistency<S: Into<String>>(message: S) -> Self {
        HistGbmError::Consistency {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network<S: Into<String>>(message: S) -> Self {
        HistGbmError::Network {
            message: message.into(),
        }
    }

    /// Create an invalid-parameter error.
    pub fn invalid_parameter<P, V, R>(parameter: P, value: V, reason: R) -> Self
    where
        P: Into<String>,
        V: Into<String>,
        R: Into<String>,
    {
        HistGbmError::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Short category string, used in diagnostics and tests.
    pub fn category(&self) -> &'static str {
        match self {
            HistGbmError::Config { .. } => "config",
            HistGbmError::Io { .. } => "io",
            HistGbmError::IoFormat { .. } => "io_format",
            HistGbmError::Parse { .. } => "parse",
            HistGbmError::Consistency { .. } => "consistency",
            HistGbmError::Network { .. } => "network",
            HistGbmError::InvalidParameter { .. } => "invalid_parameter",
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HistGbmError>;
