//! Line parser contract
//!
//! The pipeline hands every line (terminator stripped) to a [`LineParser`]
//! and never looks inside the records it gets back. Implement the trait for
//! each dump format.

pub mod isbn;
pub mod openlibrary;

use thiserror::Error;

pub use openlibrary::{Edition, EditionParser};

/// Outcome of parsing a line that was not malformed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<R> {
    /// The line produced a record
    Record(R),
    /// The line is intentionally excluded from the output
    NotApplicable(SkipReason),
}

/// Why a line was excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The line describes a different record type
    WrongRecordType,
    /// The line has this many columns instead of the expected layout
    WrongColumnCount(usize),
}

/// A line that should have produced a record but could not be parsed
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Parser for a single dump line
pub trait LineParser: Send + Sync + 'static {
    /// Record produced for a qualifying line
    type Record: Send + 'static;

    /// Classify and parse one line
    ///
    /// # Arguments
    /// * `line` - Raw line bytes without the trailing terminator
    fn parse_line(&self, line: &[u8]) -> Result<Parsed<Self::Record>, ParseError>;
}
