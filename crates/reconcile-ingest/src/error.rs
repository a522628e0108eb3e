//! Pipeline error taxonomy
//!
//! Every error carries the [`Stage`] it was raised in so callers can branch on
//! category without matching on messages. Planning, configuration, writing and
//! task failures end a run; parse errors and read faults are reported on the
//! error channel while the rest of the run continues.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::parser::ParseError;
use crate::store::StoreError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Reading,
    Parsing,
    Writing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Reading => "reading",
            Stage::Parsing => "parsing",
            Stage::Writing => "writing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Cannot read source {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No line terminator within {searched} bytes after offset {offset}")]
    BoundaryNotFound { offset: u64, searched: u64 },

    #[error("Invalid pipeline configuration: {0}")]
    Config(String),

    #[error("Parse error in chunk {chunk} at byte {offset}: {source}")]
    Parse {
        chunk: usize,
        offset: u64,
        #[source]
        source: ParseError,
    },

    #[error("Read fault in chunk {chunk} near byte {offset}, {unread_bytes} bytes left unread: {source}")]
    Read {
        chunk: usize,
        offset: u64,
        unread_bytes: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Line at byte {offset} in chunk {chunk} exceeds {limit} bytes, {unread_bytes} bytes left unread")]
    LineTooLong {
        chunk: usize,
        offset: u64,
        limit: usize,
        unread_bytes: u64,
    },

    #[error("Grouped write of {rows} rows failed: {source}")]
    Write {
        rows: usize,
        #[source]
        source: StoreError,
    },

    #[error("{stage} task failed: {message}")]
    Task { stage: Stage, message: String },
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Source { .. }
            | PipelineError::BoundaryNotFound { .. }
            | PipelineError::Config(_) => Stage::Planning,
            PipelineError::Read { .. } | PipelineError::LineTooLong { .. } => Stage::Reading,
            PipelineError::Parse { .. } => Stage::Parsing,
            PipelineError::Write { .. } => Stage::Writing,
            PipelineError::Task { stage, .. } => *stage,
        }
    }

    /// Whether this error ends the run rather than a single line or chunk
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::Parse { .. }
                | PipelineError::Read { .. }
                | PipelineError::LineTooLong { .. }
        )
    }

    /// Bytes of a chunk that were never scanned because of this error
    pub fn unread_bytes(&self) -> u64 {
        match self {
            PipelineError::Read { unread_bytes, .. }
            | PipelineError::LineTooLong { unread_bytes, .. } => *unread_bytes,
            _ => 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_discriminator() {
        let boundary = PipelineError::BoundaryNotFound {
            offset: 10,
            searched: 20,
        };
        assert_eq!(boundary.stage(), Stage::Planning);
        assert!(boundary.is_fatal());

        let parse = PipelineError::Parse {
            chunk: 0,
            offset: 5,
            source: ParseError::InvalidField {
                field: "key",
                reason: "missing".to_string(),
            },
        };
        assert_eq!(parse.stage(), Stage::Parsing);
        assert!(!parse.is_fatal());

        let too_long = PipelineError::LineTooLong {
            chunk: 2,
            offset: 100,
            limit: 8,
            unread_bytes: 42,
        };
        assert_eq!(too_long.stage(), Stage::Reading);
        assert_eq!(too_long.unread_bytes(), 42);
        assert!(!too_long.is_fatal());

        let task = PipelineError::Task {
            stage: Stage::Writing,
            message: "panicked".to_string(),
        };
        assert_eq!(task.stage(), Stage::Writing);
        assert!(task.is_fatal());
    }

    #[test]
    fn test_messages_name_location() {
        let err = PipelineError::Read {
            chunk: 3,
            offset: 4096,
            unread_bytes: 100,
            source: std::io::Error::other("disk gone"),
        };
        let msg = err.to_string();
        assert!(msg.contains("chunk 3"));
        assert!(msg.contains("4096"));
        assert!(msg.contains("100 bytes left unread"));
    }
}
