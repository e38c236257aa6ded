//! Soft structural invariants
//!
//! Many fields in these formats were only ever observed with one value
//! (usually zero). Those observations are encoded as `InvariantCheck`s.
//! A `Validator` turns failed checks into diagnostics that are logged and
//! collected, or into hard `ParseError::InvariantViolated` errors when
//! strict validation is requested.

use serde::Serialize;

use crate::traits::{ParseError, ParseOptions, ParseResult};

/// Outcome of one structural check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantCheck {
    Ok,
    UnexpectedNonZero { field: &'static str, value: i64 },
    UnexpectedValue { field: &'static str, expected: i64, found: i64 },
    OutOfRange { field: &'static str, value: i64, min: i64, max: i64 },
    UnknownBits { field: &'static str, bits: u64 },
    UnexpectedByte { field: &'static str, index: usize, value: u8 },
}

impl InvariantCheck {
    /// Field must be zero
    pub fn zero(field: &'static str, value: impl Into<i64>) -> Self {
        let value = value.into();
        if value == 0 {
            Self::Ok
        } else {
            Self::UnexpectedNonZero { field, value }
        }
    }

    /// Every byte of a reserved span must be zero
    pub fn zero_bytes(field: &'static str, bytes: &[u8]) -> Self {
        Self::bytes_in(field, bytes, &[0])
    }

    /// Every byte must be one of `allowed`
    pub fn bytes_in(field: &'static str, bytes: &[u8], allowed: &[u8]) -> Self {
        match bytes.iter().position(|b| !allowed.contains(b)) {
            None => Self::Ok,
            Some(index) => Self::UnexpectedByte {
                field,
                index,
                value: bytes[index],
            },
        }
    }

    /// Field must equal a known constant
    pub fn equals(field: &'static str, expected: impl Into<i64>, found: impl Into<i64>) -> Self {
        let (expected, found) = (expected.into(), found.into());
        if expected == found {
            Self::Ok
        } else {
            Self::UnexpectedValue { field, expected, found }
        }
    }

    /// Field must lie within `min..=max`
    pub fn in_range(field: &'static str, value: impl Into<i64>, min: i64, max: i64) -> Self {
        let value = value.into();
        if (min..=max).contains(&value) {
            Self::Ok
        } else {
            Self::OutOfRange { field, value, min, max }
        }
    }

    /// Flag word must not set bits outside `known`
    pub fn known_bits(field: &'static str, bits: u64, known: u64) -> Self {
        let unknown = bits & !known;
        if unknown == 0 {
            Self::Ok
        } else {
            Self::UnknownBits { field, bits: unknown }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Name of the checked field, if the check failed
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Ok => None,
            Self::UnexpectedNonZero { field, .. }
            | Self::UnexpectedValue { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::UnknownBits { field, .. }
            | Self::UnexpectedByte { field, .. } => Some(field),
        }
    }

    /// Description of the failure, if the check failed
    pub fn describe(&self) -> Option<String> {
        match self {
            Self::Ok => None,
            Self::UnexpectedNonZero { value, .. } => Some(format!("expected zero, found {value}")),
            Self::UnexpectedValue { expected, found, .. } => {
                Some(format!("expected {expected}, found {found}"))
            }
            Self::OutOfRange { value, min, max, .. } => {
                Some(format!("{value} outside {min}..={max}"))
            }
            Self::UnknownBits { bits, .. } => Some(format!("unknown bits 0x{bits:X}")),
            Self::UnexpectedByte { index, value, .. } => {
                Some(format!("unexpected byte 0x{value:02X} at index {index}"))
            }
        }
    }
}

/// One soft problem found while decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub offset: u64,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X} {}: {}", self.offset, self.field, self.message)
    }
}

/// Diagnostics collected during one decode call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Diagnostics raised for one field name
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics.iter().filter(move |d| d.field == field)
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.diagnostics.extend(other.diagnostics);
    }
}

/// Applies invariant checks according to the parse options
#[derive(Debug)]
pub struct Validator {
    strict: bool,
    report: ValidationReport,
}

impl Validator {
    pub fn new(options: &ParseOptions) -> Self {
        Self {
            strict: options.strict_validation,
            report: ValidationReport::default(),
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Record a check made on data at `offset`
    pub fn check(&mut self, offset: u64, check: InvariantCheck) -> ParseResult<()> {
        match (check.field(), check.describe()) {
            (Some(field), Some(message)) => self.report(offset, field, message),
            _ => Ok(()),
        }
    }

    /// Record a free-form soft problem
    pub fn report(&mut self, offset: u64, field: &str, message: impl Into<String>) -> ParseResult<()> {
        let message = message.into();
        if self.strict {
            return Err(ParseError::invariant(offset, field, message));
        }

        tracing::warn!(offset, field, %message, "Soft invariant failed");
        self.report.diagnostics.push(Diagnostic {
            offset,
            field: field.to_string(),
            message,
        });
        Ok(())
    }

    /// Finish validation and hand back the collected diagnostics
    pub fn finish(self) -> ValidationReport {
        self.report
    }
}
