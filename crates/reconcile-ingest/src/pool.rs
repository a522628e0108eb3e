//! Worker pool and chunk dispatcher
//!
//! One producer feeds planned chunks into a bounded queue; `worker_count`
//! workers pull from it until it is drained and closed. Every participant
//! runs on the blocking thread pool. Once all workers have been joined the
//! pool drops its record sender: that closure is the only signal downstream
//! that no more records will arrive. The error sink is borrowed and never
//! closed here.

use crossbeam::channel;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::parser::LineParser;
use crate::planner::Chunk;
use crate::worker::{ChunkWorker, WorkerStats};

/// Totals for one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Chunks handed to the queue before it was closed
    pub chunks_dispatched: usize,
    pub workers: usize,
    pub totals: WorkerStats,
}

pub struct WorkerPool<P: LineParser> {
    parser: Arc<P>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<P: LineParser> WorkerPool<P> {
    pub fn new(parser: Arc<P>, config: &PipelineConfig, cancel: CancellationToken) -> Self {
        Self {
            parser,
            config: config.clone(),
            cancel,
        }
    }

    /// Process every chunk, returning once all workers have exited
    ///
    /// `records` is consumed and dropped before returning. Cancellation
    /// stops dispatch; workers finish their current line and exit.
    pub async fn run(
        &self,
        chunks: Vec<Chunk>,
        records: mpsc::Sender<P::Record>,
        errors: &mpsc::Sender<PipelineError>,
    ) -> Result<PoolStats> {
        let worker_count = self.config.worker_count.clamp(1, chunks.len().max(1));
        let (chunk_tx, chunk_rx) = channel::bounded::<Chunk>(self.config.chunk_queue_capacity);

        info!(
            chunks = chunks.len(),
            workers = worker_count,
            "Starting worker pool"
        );

        let cancel = self.cancel.clone();
        let producer = tokio::task::spawn_blocking(move || {
            let mut dispatched = 0usize;
            for chunk in chunks {
                if cancel.is_cancelled() {
                    debug!(dispatched, "Dispatch stopped by cancellation");
                    break;
                }
                // Fails only once every worker has gone away
                if chunk_tx.send(chunk).is_err() {
                    break;
                }
                dispatched += 1;
            }
            dispatched
        });

        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let queue = chunk_rx.clone();
            let records = records.clone();
            let errors = errors.clone();
            let cancel = self.cancel.clone();
            let mut worker = ChunkWorker::new(id, Arc::clone(&self.parser), &self.config, cancel.clone());

            handles.push(tokio::task::spawn_blocking(move || {
                for chunk in queue.iter() {
                    if cancel.is_cancelled() || records.is_closed() {
                        break;
                    }
                    worker.process(&chunk, &records, &errors);
                }
                worker.into_stats()
            }));
        }
        drop(chunk_rx);

        let mut stats = PoolStats {
            workers: worker_count,
            ..PoolStats::default()
        };
        let mut failure = None;

        for handle in handles {
            match handle.await {
                Ok(worker_stats) => stats.totals.merge(&worker_stats),
                Err(e) => {
                    error!(error = %e, "Worker task failed");
                    self.cancel.cancel();
                    failure.get_or_insert(PipelineError::Task {
                        stage: Stage::Reading,
                        message: e.to_string(),
                    });
                }
            }
        }

        match producer.await {
            Ok(dispatched) => stats.chunks_dispatched = dispatched,
            Err(e) => {
                failure.get_or_insert(PipelineError::Task {
                    stage: Stage::Planning,
                    message: e.to_string(),
                });
            }
        }

        drop(records);

        if let Some(err) = failure {
            return Err(err);
        }

        info!(
            chunks = stats.totals.chunks_processed,
            lines = stats.totals.lines_read,
            records = stats.totals.records_emitted,
            "Worker pool finished"
        );

        Ok(stats)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::parser::{ParseError, Parsed};
    use crate::planner::plan;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct NumberParser;

    impl LineParser for NumberParser {
        type Record = u64;

        fn parse_line(&self, line: &[u8]) -> std::result::Result<Parsed<u64>, ParseError> {
            std::str::from_utf8(line)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Parsed::Record)
                .ok_or_else(|| ParseError::InvalidField {
                    field: "number",
                    reason: "not a number".to_string(),
                })
        }
    }

    fn numbers_file(count: u64) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for n in 0..count {
            writeln!(file, "{}", n).unwrap();
        }
        file
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_closes_record_sink_after_all_chunks() {
        let file = numbers_file(1000);
        let config = PipelineConfig::new().with_chunk_size(100).with_worker_count(4);
        let chunks = plan(file.path(), &config).unwrap();
        let planned = chunks.len();

        let (record_tx, mut record_rx) = mpsc::channel(16);
        let (error_tx, _error_rx) = mpsc::channel(16);
        let pool = WorkerPool::new(Arc::new(NumberParser), &config, CancellationToken::new());

        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(n) = record_rx.recv().await {
                seen.push(n);
            }
            seen
        });

        let stats = pool.run(chunks, record_tx, &error_tx).await.unwrap();
        let mut seen = collector.await.unwrap();
        seen.sort_unstable();

        assert_eq!(seen, (0..1000).collect::<Vec<_>>());
        assert_eq!(stats.chunks_dispatched, planned);
        assert_eq!(stats.totals.chunks_processed, planned);
        assert_eq!(stats.totals.records_emitted, 1000);
        assert_eq!(stats.workers, 4);
        assert!(!error_tx.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_pool_dispatches_nothing() {
        let file = numbers_file(100);
        let config = PipelineConfig::new().with_chunk_size(10).with_worker_count(2);
        let chunks = plan(file.path(), &config).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let (record_tx, mut record_rx) = mpsc::channel(16);
        let (error_tx, _error_rx) = mpsc::channel(16);
        let pool = WorkerPool::new(Arc::new(NumberParser), &config, cancel);

        let stats = pool.run(chunks, record_tx, &error_tx).await.unwrap();
        assert_eq!(stats.chunks_dispatched, 0);
        assert_eq!(stats.totals.records_emitted, 0);
        assert!(record_rx.recv().await.is_none());
    }
}
