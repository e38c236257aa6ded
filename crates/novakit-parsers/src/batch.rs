//! Round-trip checking over many files
//!
//! Each file is decoded and re-encoded on the rayon pool. A failure in one
//! file is recorded in its own result and never stops the batch.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::registry::ParserRegistry;
use crate::traits::ParseOptions;

/// Comparison of a file with its re-encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundTrip {
    pub input_len: usize,
    pub output_len: usize,
    pub identical: bool,
    /// First byte offset where the two differ
    pub first_difference: Option<usize>,
    /// Soft diagnostics raised while decoding
    pub diagnostics: usize,
}

impl RoundTrip {
    pub fn compare(original: &[u8], encoded: &[u8], diagnostics: usize) -> Self {
        let first_difference = original
            .iter()
            .zip(encoded)
            .position(|(a, b)| a != b)
            .or_else(|| (original.len() != encoded.len()).then(|| original.len().min(encoded.len())));

        Self {
            input_len: original.len(),
            output_len: encoded.len(),
            identical: first_difference.is_none(),
            first_difference,
            diagnostics,
        }
    }
}

/// Outcome for one file in a batch
#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub path: PathBuf,
    /// Parser that handled the file, if one was found
    pub parser: Option<String>,
    pub result: Result<RoundTrip, String>,
}

impl FileCheck {
    pub fn passed(&self) -> bool {
        matches!(&self.result, Ok(trip) if trip.identical)
    }
}

/// Round-trip one file
pub fn check_file(registry: &ParserRegistry, path: &Path, options: &ParseOptions) -> FileCheck {
    let parser = match registry.get_for_path(path) {
        Ok(parser) => parser,
        Err(e) => {
            return FileCheck {
                path: path.to_path_buf(),
                parser: None,
                result: Err(e.to_string()),
            }
        }
    };

    let result = std::fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|data| parser.round_trip(&data, options).map_err(|e| e.to_string()));

    if let Err(message) = &result {
        crate::log_parse_error!(parser.name(), message);
    }

    FileCheck {
        path: path.to_path_buf(),
        parser: Some(parser.name().to_string()),
        result,
    }
}

/// Round-trip every file in parallel, keeping input order
pub fn check_files(registry: &ParserRegistry, paths: &[PathBuf], options: &ParseOptions) -> Vec<FileCheck> {
    let results: Vec<FileCheck> = paths.par_iter().map(|path| check_file(registry, path, options)).collect();

    let passed = results.iter().filter(|r| r.passed()).count();
    tracing::info!(total = results.len(), passed, "Round-trip batch complete");
    results
}
