//! Persistent store contract
//!
//! The batch writer owns exactly one [`BatchStore`] and is its only user. A
//! store performs one grouped write per call, sized to the slice it is given.

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use sqlite::{SqliteRow, SqliteStore};

/// Largest number of bound parameters SQLite accepts in one statement
pub const SQLITE_MAX_PARAMETERS: usize = 32_766;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Batch of {rows} rows x {columns} columns exceeds the {limit} parameter limit")]
    TooManyParameters {
        rows: usize,
        columns: usize,
        limit: usize,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Grouped writes of records
#[async_trait]
pub trait BatchStore<R>: Send {
    /// Write all of `records` as one grouped statement
    ///
    /// Returns the number of rows affected.
    async fn write_batch(&mut self, records: &[R]) -> Result<u64, StoreError>;
}

#[async_trait]
impl<R, S> BatchStore<R> for &mut S
where
    R: Sync,
    S: BatchStore<R> + ?Sized,
{
    async fn write_batch(&mut self, records: &[R]) -> Result<u64, StoreError> {
        (**self).write_batch(records).await
    }
}

/// Store that keeps nothing and only counts rows
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingStore {
    rows: u64,
    batches: u64,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }
}

#[async_trait]
impl<R: Sync> BatchStore<R> for CountingStore {
    async fn write_batch(&mut self, records: &[R]) -> Result<u64, StoreError> {
        self.rows += records.len() as u64;
        self.batches += 1;
        Ok(records.len() as u64)
    }
}
