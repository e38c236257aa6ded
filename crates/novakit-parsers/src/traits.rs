//! Core traits defining the codec interface for all file formats.
//!
//! Every format in this crate is decoded from a fully materialized byte
//! buffer and serialized back into one. This module holds the pieces they
//! share:
//! - The error taxonomy (`ParseError`) with byte offsets and field names
//! - Parse options that toggle validation strictness
//! - The `Parser` trait implemented by each codec
//! - `HumanReadable` for text/JSON/YAML dumps of decoded models

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::validation::ValidationReport;

/// Errors that can occur during decoding or encoding
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed header at offset {offset} ({field}): {message}")]
    MalformedHeader {
        offset: u64,
        field: String,
        message: String,
    },

    #[error("Truncated data at offset {offset} ({field}): requested {requested}, available {available}")]
    TruncatedData {
        offset: u64,
        field: String,
        requested: u64,
        available: u64,
    },

    #[error("Invariant violated at offset {offset} ({field}): {detail}")]
    InvariantViolated {
        offset: u64,
        field: String,
        detail: String,
    },

    #[error("Invalid bit count: {requested} (must be 1..=32)")]
    InvalidBitCount { requested: u32 },

    #[error("Length overflow in {field}: {length} exceeds maximum {max}")]
    LengthOverflow { field: String, length: u64, max: u64 },

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Nested error in {context}: {source}")]
    Nested {
        context: String,
        #[source]
        source: Box<ParseError>,
    },
}

/// Coarse classification of a `ParseError`, looking through nesting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    MalformedHeader,
    TruncatedData,
    InvariantViolated,
    InvalidBitCount,
    LengthOverflow,
    DecompressionFailed,
    InvalidStructure,
    EntryNotFound,
}

impl ParseError {
    /// Wrap this error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ParseError::Nested {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn malformed(offset: u64, field: impl Into<String>, message: impl Into<String>) -> Self {
        ParseError::MalformedHeader {
            offset,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn truncated(offset: u64, field: impl Into<String>, requested: u64, available: u64) -> Self {
        ParseError::TruncatedData {
            offset,
            field: field.into(),
            requested,
            available,
        }
    }

    pub fn invariant(offset: u64, field: impl Into<String>, detail: impl Into<String>) -> Self {
        ParseError::InvariantViolated {
            offset,
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub fn overflow(field: impl Into<String>, length: u64, max: u64) -> Self {
        ParseError::LengthOverflow {
            field: field.into(),
            length,
            max,
        }
    }

    /// The innermost error, with all context layers removed
    pub fn root_cause(&self) -> &ParseError {
        match self {
            ParseError::Nested { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Classification of the innermost error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::Io(_) => ErrorKind::Io,
            ParseError::MalformedHeader { .. } => ErrorKind::MalformedHeader,
            ParseError::TruncatedData { .. } => ErrorKind::TruncatedData,
            ParseError::InvariantViolated { .. } => ErrorKind::InvariantViolated,
            ParseError::InvalidBitCount { .. } => ErrorKind::InvalidBitCount,
            ParseError::LengthOverflow { .. } => ErrorKind::LengthOverflow,
            ParseError::DecompressionFailed(_) => ErrorKind::DecompressionFailed,
            ParseError::InvalidStructure(_) => ErrorKind::InvalidStructure,
            ParseError::EntryNotFound(_) => ErrorKind::EntryNotFound,
            ParseError::Nested { source, .. } => source.kind(),
        }
    }
}

impl From<ParseError> for novakit_core::Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(io) => novakit_core::Error::Io(io),
            ParseError::EntryNotFound(name) => novakit_core::Error::EntryNotFound { name },
            other => novakit_core::Error::InvalidData {
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Configuration options for parsing
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Promote soft invariant diagnostics to hard errors
    pub strict_validation: bool,
    /// Enforce declared record lengths (mark / assert-consumed checks)
    pub check_record_lengths: bool,
    /// Whether to skip unknown chunk types instead of erroring
    pub skip_unknown_chunks: bool,
    /// Maximum nesting depth for recursive chunk trees
    pub max_nesting_depth: u32,
    /// Whether to use memory mapping for large files
    pub use_memory_mapping: bool,
    /// Minimum file size to enable memory mapping
    pub memory_mapping_threshold: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_validation: false,
            check_record_lengths: true,
            skip_unknown_chunks: true,
            max_nesting_depth: 32,
            use_memory_mapping: true,
            memory_mapping_threshold: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl ParseOptions {
    /// Options for validation tooling: every diagnostic is fatal
    pub fn strict() -> Self {
        Self {
            strict_validation: true,
            skip_unknown_chunks: false,
            ..Self::default()
        }
    }
}

/// A decoded value together with the soft diagnostics raised on the way
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub value: T,
    pub report: ValidationReport,
}

impl<T> Decoded<T> {
    pub fn new(value: T, report: ValidationReport) -> Self {
        Self { value, report }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Core trait for all file format codecs
///
/// Implementors decode one format from a complete in-memory buffer and
/// serialize the decoded model back into the same byte layout.
pub trait Parser: Send + Sync {
    /// The decoded model type
    type Output: Send + Sync;

    /// Returns the file extensions this parser handles (e.g., ["bms"])
    fn extensions(&self) -> &[&str];

    /// Returns the magic bytes that identify this file type (if applicable)
    fn magic_bytes(&self) -> Option<&[u8]> {
        None
    }

    /// Returns a human-readable name for this parser
    fn name(&self) -> &str;

    /// Decode a buffer, returning the model and its diagnostics
    fn decode(&self, data: &[u8], options: &ParseOptions) -> ParseResult<Decoded<Self::Output>>;

    /// Serialize a model back into its on-disk byte layout
    fn serialize(&self, value: &Self::Output) -> ParseResult<Vec<u8>>;

    /// Parse a buffer with default options
    fn parse(&self, data: &[u8]) -> ParseResult<Self::Output> {
        self.parse_with_options(data, &ParseOptions::default())
    }

    /// Parse a buffer with custom options
    fn parse_with_options(&self, data: &[u8], options: &ParseOptions) -> ParseResult<Self::Output> {
        self.decode(data, options).map(Decoded::into_value)
    }

    /// Parse from a file path
    fn parse_file(&self, path: &Path) -> ParseResult<Self::Output> {
        self.parse_file_with_options(path, &ParseOptions::default())
    }

    /// Parse from a file path with options
    fn parse_file_with_options(&self, path: &Path, options: &ParseOptions) -> ParseResult<Self::Output> {
        self.decode_file(path, options).map(Decoded::into_value)
    }

    /// Decode a file, memory mapping it when it is large enough
    fn decode_file(&self, path: &Path, options: &ParseOptions) -> ParseResult<Decoded<Self::Output>> {
        let file = std::fs::File::open(path)?;

        if options.use_memory_mapping {
            let metadata = file.metadata()?;
            if metadata.len() >= options.memory_mapping_threshold {
                // SAFETY: the mapping is read-only and dropped before returning;
                // the decoded model owns copies of everything it keeps.
                #[allow(unsafe_code)]
                let mmap = unsafe { memmap2::Mmap::map(&file)? };
                return self.decode(&mmap, options);
            }
        }

        let data = std::fs::read(path)?;
        self.decode(&data, options)
    }

    /// Check if this parser can handle the given file
    fn can_parse(&self, path: &Path) -> bool {
        // Check extension
        if let Some(ext) = path.extension() {
            let ext_str = ext.to_string_lossy().to_lowercase();
            if self.extensions().iter().any(|e| e.to_lowercase() == ext_str) {
                return true;
            }
        }

        // Try to check magic bytes if available
        if let Some(magic) = self.magic_bytes() {
            if let Ok(file) = std::fs::File::open(path) {
                use std::io::Read;
                let mut reader = std::io::BufReader::new(file);
                let mut buffer = vec![0u8; magic.len()];
                if reader.read_exact(&mut buffer).is_ok() {
                    return buffer == magic;
                }
            }
        }

        false
    }
}

/// Trait for converting decoded models to human-readable formats
pub trait HumanReadable: Serialize {
    /// Convert to a human-readable summary
    fn to_readable_string(&self) -> String;

    /// Convert to JSON
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Convert to YAML (falls back to the readable summary)
    fn to_yaml(&self) -> String {
        serde_yaml::to_string(&self.to_json()).unwrap_or_else(|_| self.to_readable_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_context() {
        let error = ParseError::malformed(0, "magic", "expected 3DI3");

        let contextualized = error.with_context("parsing header");

        match &contextualized {
            ParseError::Nested { context, .. } => {
                assert_eq!(context, "parsing header");
            }
            _ => panic!("Expected Nested error"),
        }
        assert_eq!(contextualized.kind(), ErrorKind::MalformedHeader);
    }

    #[test]
    fn test_truncated_message_names_field() {
        let error = ParseError::truncated(612, "num_events", 4, 2);
        let text = error.to_string();
        assert!(text.contains("612"));
        assert!(text.contains("num_events"));
    }

    #[test]
    fn test_strict_preset() {
        let options = ParseOptions::strict();
        assert!(options.strict_validation);
        assert!(!options.skip_unknown_chunks);
        assert!(options.check_record_lengths);
    }

    #[test]
    fn test_into_core_error() {
        let core: novakit_core::Error = ParseError::EntryNotFound("x.bms".into()).into();
        assert!(core.is_not_found());

        let core: novakit_core::Error = ParseError::invariant(8, "count", "bad").into();
        assert!(core.is_format_error());
    }
}
