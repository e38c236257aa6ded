//! Unified error handling for novakit
//!
//! Codec errors carry byte offsets and field names of their own; this type
//! is what file-level tooling reports once a codec error has left the
//! parser crate.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for file-level operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ==================== Format Errors ====================

    /// A codec rejected the input
    #[error("{format} decode failed: {message}")]
    Decode {
        format: String,
        message: String,
    },

    /// A codec could not serialize a model
    #[error("{format} encode failed: {message}")]
    Encode {
        format: String,
        message: String,
    },

    /// No codec is registered for the file
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        format: String,
    },

    /// Invalid data structure
    #[error("Invalid data: {message}")]
    InvalidData {
        message: String,
    },

    /// Re-serialized output differs from the input
    #[error("Round trip mismatch at byte {offset} (input {expected_len} bytes, output {actual_len} bytes)")]
    RoundTripMismatch {
        offset: usize,
        expected_len: usize,
        actual_len: usize,
    },

    // ==================== Archive Errors ====================

    /// Entry not found in a pack archive
    #[error("Archive entry not found: {name}")]
    EntryNotFound {
        name: String,
    },

    // ==================== General Errors ====================

    /// Custom error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// Several independent operations failed
    #[error("{} operations failed", .0.len())]
    Multiple(Vec<Error>),
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::InvalidData {
            message: message.into(),
        }
    }

    /// Compare an input buffer with its re-serialized form
    pub fn check_round_trip(expected: &[u8], actual: &[u8]) -> Result<()> {
        if expected == actual {
            return Ok(());
        }

        let offset = expected
            .iter()
            .zip(actual)
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| expected.len().min(actual.len()));

        Err(Error::RoundTripMismatch {
            offset,
            expected_len: expected.len(),
            actual_len: actual.len(),
        })
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::FileNotFound(_) | Error::EntryNotFound { .. } => true,
            Error::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error came out of a codec
    pub fn is_format_error(&self) -> bool {
        match self {
            Error::Decode { .. }
            | Error::Encode { .. }
            | Error::InvalidData { .. }
            | Error::RoundTripMismatch { .. } => true,
            Error::WithContext { source, .. } => source.is_format_error(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::FileNotFound(PathBuf::from("/test"));
        let contextualized = err.with_context("while loading mission");

        assert!(contextualized.to_string().contains("while loading mission"));
        assert!(contextualized.is_not_found());
    }

    #[test]
    fn test_round_trip_identical() {
        assert!(Error::check_round_trip(b"abc", b"abc").is_ok());
    }

    #[test]
    fn test_round_trip_first_difference() {
        match Error::check_round_trip(b"abcd", b"abXd") {
            Err(Error::RoundTripMismatch { offset, .. }) => assert_eq!(offset, 2),
            other => panic!("Expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_length_difference() {
        match Error::check_round_trip(b"abcd", b"ab") {
            Err(Error::RoundTripMismatch { offset, expected_len, actual_len }) => {
                assert_eq!(offset, 2);
                assert_eq!(expected_len, 4);
                assert_eq!(actual_len, 2);
            }
            other => panic!("Expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::EntryNotFound { name: "a.bms".into() });
        let with_context = result.context("reading pack");

        let err = with_context.unwrap_err();
        assert!(err.to_string().contains("reading pack"));
        assert!(err.is_not_found());
        assert!(!err.is_format_error());
    }
}
