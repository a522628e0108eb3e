//! Pipeline and store configuration
//!
//! Settings are plain values handed to the planner, pool and writer when they
//! are constructed, so several pipelines can run side by side in one process
//! with different tuning.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Target chunk size in bytes. Chunks end on the first newline after this.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1000 * 1000;

/// Rows per grouped insert.
pub const DEFAULT_BATCH_SIZE: usize = 250;

/// Bytes read per probe when looking for a chunk boundary.
pub const DEFAULT_LOOK_AHEAD: usize = 10 * 1000;

/// Longest line the workers accept, and so the furthest the planner searches
/// for a boundary before giving up.
pub const DEFAULT_MAX_LINE_LEN: usize = 10 * 1000 * 1000;

/// Buffered reader capacity per worker.
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Planned chunks queued ahead of the workers.
pub const DEFAULT_CHUNK_QUEUE_CAPACITY: usize = 20;

/// Parsed records buffered between the workers and the writer.
pub const DEFAULT_RECORD_CHANNEL_CAPACITY: usize = 256;

/// Recoverable errors buffered ahead of the error collector.
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 1024;

/// Error messages kept verbatim in the run report.
pub const DEFAULT_MAX_ERROR_SAMPLES: usize = 100;

/// SQLite database used when `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:reconcile.db";

/// Tuning for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub chunk_size: u64,
    /// Defaults to the number of logical CPUs; 1 gives a sequential scan.
    pub worker_count: usize,
    pub batch_size: usize,
    pub look_ahead: usize,
    pub max_look_ahead: usize,
    pub max_line_len: usize,
    pub read_buffer: usize,
    pub chunk_queue_capacity: usize,
    pub record_channel_capacity: usize,
    pub error_channel_capacity: usize,
    pub max_error_samples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            worker_count: num_cpus::get(),
            batch_size: DEFAULT_BATCH_SIZE,
            look_ahead: DEFAULT_LOOK_AHEAD,
            max_look_ahead: DEFAULT_MAX_LINE_LEN,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            read_buffer: DEFAULT_READ_BUFFER,
            chunk_queue_capacity: DEFAULT_CHUNK_QUEUE_CAPACITY,
            record_channel_capacity: DEFAULT_RECORD_CHANNEL_CAPACITY,
            error_channel_capacity: DEFAULT_ERROR_CHANNEL_CAPACITY,
            max_error_samples: DEFAULT_MAX_ERROR_SAMPLES,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a `.env` file and the environment
    ///
    /// Recognised variables: `RECONCILE_CHUNK_SIZE`, `RECONCILE_WORKERS`,
    /// `RECONCILE_BATCH_SIZE`, `RECONCILE_LOOK_AHEAD`, `RECONCILE_MAX_LINE_LEN`.
    /// Values that do not parse are ignored.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let max_line_len = env_or("RECONCILE_MAX_LINE_LEN", defaults.max_line_len);

        Self {
            chunk_size: env_or("RECONCILE_CHUNK_SIZE", defaults.chunk_size),
            worker_count: env_or("RECONCILE_WORKERS", defaults.worker_count),
            batch_size: env_or("RECONCILE_BATCH_SIZE", defaults.batch_size),
            look_ahead: env_or("RECONCILE_LOOK_AHEAD", defaults.look_ahead),
            max_look_ahead: max_line_len,
            max_line_len,
            ..defaults
        }
    }

    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows;
        self
    }

    pub fn with_look_ahead(mut self, bytes: usize) -> Self {
        self.look_ahead = bytes;
        self
    }

    /// Caps both the boundary search and the accepted line length
    pub fn with_max_line_len(mut self, bytes: usize) -> Self {
        self.max_line_len = bytes;
        self.max_look_ahead = bytes;
        self
    }

    pub fn with_record_channel_capacity(mut self, capacity: usize) -> Self {
        self.record_channel_capacity = capacity;
        self
    }

    pub fn with_error_channel_capacity(mut self, capacity: usize) -> Self {
        self.error_channel_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PipelineError::config("chunk_size must be greater than 0"));
        }

        if self.worker_count == 0 {
            return Err(PipelineError::config("worker_count must be greater than 0"));
        }

        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be greater than 0"));
        }

        if self.look_ahead == 0 {
            return Err(PipelineError::config("look_ahead must be greater than 0"));
        }

        if self.max_look_ahead < self.look_ahead {
            return Err(PipelineError::config(format!(
                "max_look_ahead ({}) cannot be smaller than look_ahead ({})",
                self.max_look_ahead, self.look_ahead
            )));
        }

        if self.max_line_len == 0 || self.read_buffer == 0 {
            return Err(PipelineError::config(
                "max_line_len and read_buffer must be greater than 0",
            ));
        }

        if self.chunk_queue_capacity == 0
            || self.record_channel_capacity == 0
            || self.error_channel_capacity == 0
        {
            return Err(PipelineError::config("channel capacities must be greater than 0"));
        }

        Ok(())
    }
}

/// Where parsed records are persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 10_000_000);
        assert_eq!(config.batch_size, 250);
        assert!(config.worker_count >= 1);
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(PipelineConfig::new().with_chunk_size(0).validate().is_err());
        assert!(PipelineConfig::new().with_worker_count(0).validate().is_err());
        assert!(PipelineConfig::new().with_batch_size(0).validate().is_err());
        assert!(PipelineConfig::new()
            .with_record_channel_capacity(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_look_ahead_cannot_exceed_max() {
        let config = PipelineConfig::new()
            .with_look_ahead(4096)
            .with_max_line_len(1024);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("max_look_ahead"));
    }

    #[test]
    fn test_max_line_len_caps_boundary_search() {
        let config = PipelineConfig::new().with_max_line_len(2048);
        assert_eq!(config.max_line_len, 2048);
        assert_eq!(config.max_look_ahead, 2048);
    }
}
