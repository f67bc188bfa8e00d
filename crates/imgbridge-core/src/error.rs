//! Error types module
//!
//! Every stage of a transfer reports failures through [`TransferError`]. The
//! variants follow the failure taxonomy of the pipeline: validation happens
//! before any I/O, network failures carry whatever diagnostic text was
//! captured, and conversion failures carry the output of the encoder.
//!
//! Response parsing and cleanup never produce a `TransferError`; see
//! [`crate::interpret`] and [`crate::artifact`].

use std::fmt;
use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for remote failures outside our control
    Warn,
    /// Error level - for unexpected local failures
    Error,
}

/// The network operation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Download,
    Upload,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Download => f.write_str("Download"),
            Operation::Upload => f.write_str("Upload"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{operation} failed: {message}")]
    Network {
        operation: Operation,
        message: String,
        /// Diagnostic output of the transport (curl stderr, error chain).
        stderr: Option<String>,
    },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: Operation, secs: u64 },

    #[error("{operation} failed with HTTP status {status}")]
    HttpStatus {
        operation: Operation,
        status: u16,
        body: Option<String>,
    },

    #[error("Image conversion failed: {message}")]
    Conversion {
        message: String,
        stderr: Option<String>,
        stdout: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    pub fn network(operation: Operation, message: impl Into<String>) -> Self {
        TransferError::Network {
            operation,
            message: message.into(),
            stderr: None,
        }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        TransferError::Conversion {
            message: message.into(),
            stderr: None,
            stdout: None,
        }
    }

    /// Build a network error from a reqwest failure, keeping the source chain
    /// as diagnostic text.
    pub fn from_reqwest(operation: Operation, err: &reqwest::Error) -> Self {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        TransferError::Network {
            operation,
            message: err.to_string(),
            stderr: if chain.is_empty() {
                None
            } else {
                Some(chain.join(": "))
            },
        }
    }

    /// Machine-readable error code (e.g., "HTTP_STATUS_ERROR")
    pub fn error_code(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "VALIDATION_ERROR",
            TransferError::Network { .. } => "NETWORK_ERROR",
            TransferError::Timeout { .. } => "TIMEOUT_ERROR",
            TransferError::HttpStatus { .. } => "HTTP_STATUS_ERROR",
            TransferError::Conversion { .. } => "CONVERSION_ERROR",
            TransferError::Io(_) => "IO_ERROR",
        }
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            TransferError::Validation(_) => LogLevel::Debug,
            TransferError::Network { .. }
            | TransferError::Timeout { .. }
            | TransferError::HttpStatus { .. } => LogLevel::Warn,
            TransferError::Conversion { .. } | TransferError::Io(_) => LogLevel::Error,
        }
    }

    /// Captured diagnostic text from a subprocess or the network layer.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            TransferError::Network { stderr, .. } | TransferError::Conversion { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }

    /// Captured standard output, or the response body of a rejected request.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            TransferError::Conversion { stdout, .. } => stdout.as_deref(),
            TransferError::HttpStatus { body, .. } => body.as_deref(),
            _ => None,
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

/// Trim captured process output, mapping empty output to `None`.
pub(crate) fn captured(output: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(output);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
