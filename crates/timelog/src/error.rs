//! Error and Result types for timelog operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for timelog operations.
pub type Result<T> = std::result::Result<T, TimelogError>;

/// The error type for timelog operations.
#[derive(Debug, Error)]
pub enum TimelogError {
    /// Caller input was rejected before touching any file.
    ///
    /// Raised for an empty payload, a payload containing a line terminator,
    /// a time bound that is not a valid date/time, or a bad database name.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A persisted line could not be parsed.
    ///
    /// Index replay and range scans recover from this by skipping the line;
    /// it only reaches callers of the line parsers directly.
    #[error("Malformed line {line:?}: {reason}")]
    MalformedLine {
        /// The offending line, terminator stripped.
        line: String,
        /// Why the line was rejected.
        reason: &'static str,
    },

    /// A failed write to the data file could not be undone.
    ///
    /// The end of the file is unknown; the handle refuses further appends
    /// and the store must be reopened, which repairs the tail.
    #[error("Data file {0} needs recovery after a failed write")]
    NeedsRecovery(PathBuf),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl TimelogError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn malformed(line: &str, reason: &'static str) -> Self {
        Self::MalformedLine {
            line: line.to_string(),
            reason,
        }
    }

    /// Returns true if this error rejected caller input.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}
