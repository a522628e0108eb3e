//! Batch writer
//!
//! Drains the record channel into fixed-size batches and flushes each one as
//! a single grouped write. The channel closing is the only end-of-input
//! signal: the writer then flushes the trailing partial batch, sized to its
//! own length, and returns.
//!
//! A failed flush cancels the shared token so workers stop early, and the
//! receiver is dropped on return so blocked senders are released.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{PipelineError, Result};
use crate::store::BatchStore;

/// Totals for one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub records_received: u64,
    pub rows_written: u64,
    pub batches_flushed: u64,
}

pub struct BatchWriter<S> {
    store: S,
    batch_size: usize,
    cancel: CancellationToken,
}

impl<S> BatchWriter<S> {
    pub fn new(store: S, batch_size: usize, cancel: CancellationToken) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            cancel,
        }
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Write every record received until the channel closes
    pub async fn drain<R>(&mut self, mut records: mpsc::Receiver<R>) -> Result<WriterStats>
    where
        R: Send + Sync,
        S: BatchStore<R>,
    {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut stats = WriterStats::default();

        while let Some(record) = records.recv().await {
            stats.records_received += 1;
            batch.push(record);

            if batch.len() >= self.batch_size {
                self.flush(&mut batch, &mut stats).await?;
            }
        }

        if !batch.is_empty() {
            self.flush(&mut batch, &mut stats).await?;
        }

        info!(
            rows = stats.rows_written,
            batches = stats.batches_flushed,
            cancelled = self.cancel.is_cancelled(),
            "Batch writer drained"
        );

        Ok(stats)
    }

    async fn flush<R>(&mut self, batch: &mut Vec<R>, stats: &mut WriterStats) -> Result<()>
    where
        R: Send + Sync,
        S: BatchStore<R>,
    {
        match self.store.write_batch(batch).await {
            Ok(rows) => {
                debug!(rows = batch.len(), batch = stats.batches_flushed, "Flushed batch");
                stats.rows_written += rows;
                stats.batches_flushed += 1;
                batch.clear();
                Ok(())
            }
            Err(source) => {
                error!(rows = batch.len(), error = %source, "Batch write failed, cancelling run");
                self.cancel.cancel();
                Err(PipelineError::Write {
                    rows: batch.len(),
                    source,
                })
            }
        }
    }
}
