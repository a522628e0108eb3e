//! Pipeline orchestration
//!
//! Wires planner, worker pool, batch writer and error collector together for
//! one source file:
//!
//! 1. Plan chunks on a blocking thread (fatal on failure, nothing started)
//! 2. Spawn the error collector on its own task
//! 3. Run the pool and the writer side by side until the record channel
//!    closes
//! 4. Close the error channel and join the collector
//!
//! Every task is joined before `run` returns, on success and on failure.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::parser::LineParser;
use crate::planner::ChunkPlanner;
use crate::pool::WorkerPool;
use crate::store::BatchStore;
use crate::writer::BatchWriter;

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub chunks: usize,
    pub lines_read: u64,
    pub records_emitted: u64,
    pub records_skipped: u64,
    pub records_written: u64,
    pub batches_flushed: u64,
    pub parse_errors: u64,
    pub read_faults: u64,
    /// Bytes of faulted chunks that were never scanned
    pub bytes_unread: u64,
    pub errors_by_stage: BTreeMap<Stage, u64>,
    /// The first few recoverable error messages, in arrival order
    pub error_samples: Vec<String>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct ErrorSummary {
    by_stage: BTreeMap<Stage, u64>,
    samples: Vec<String>,
}

/// Parallel chunked ingest of one source file
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Parse `path` and write every record to `store`
    ///
    /// Cancelling `cancel` stops dispatch and lets in-flight workers exit;
    /// records already received are still flushed and the report is marked
    /// `cancelled`. A failed flush cancels the run and is returned once all
    /// tasks have been joined.
    pub async fn run<P, S>(
        &self,
        path: impl AsRef<Path>,
        parser: P,
        store: &mut S,
        cancel: CancellationToken,
    ) -> Result<PipelineReport>
    where
        P: LineParser,
        P::Record: Sync,
        S: BatchStore<P::Record> + ?Sized,
    {
        let path = path.as_ref().to_path_buf();
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", %run_id, path = %path.display());

        self.run_inner(run_id, path, parser, store, cancel)
            .instrument(span)
            .await
    }

    async fn run_inner<P, S>(
        &self,
        run_id: Uuid,
        path: PathBuf,
        parser: P,
        store: &mut S,
        cancel: CancellationToken,
    ) -> Result<PipelineReport>
    where
        P: LineParser,
        P::Record: Sync,
        S: BatchStore<P::Record> + ?Sized,
    {
        let started = Instant::now();
        info!(workers = self.config.worker_count, batch_size = self.config.batch_size, "Starting pipeline");

        let planner = ChunkPlanner::new(&self.config);
        let chunks = tokio::task::spawn_blocking(move || planner.plan(&path))
            .await
            .map_err(|e| PipelineError::Task {
                stage: Stage::Planning,
                message: e.to_string(),
            })?
            .inspect_err(|e| error!(error = %e, "Planning failed"))?;
        let planned = chunks.len();

        let (record_tx, record_rx) = mpsc::channel(self.config.record_channel_capacity);
        let (error_tx, error_rx) = mpsc::channel(self.config.error_channel_capacity);

        let collector = tokio::spawn(
            collect_errors(error_rx, self.config.max_error_samples).in_current_span(),
        );

        let pool = WorkerPool::new(Arc::new(parser), &self.config, cancel.clone());
        let mut writer = BatchWriter::new(store, self.config.batch_size, cancel.clone());

        let (pool_result, writer_result) = tokio::join!(
            pool.run(chunks, record_tx, &error_tx),
            writer.drain(record_rx),
        );

        drop(error_tx);
        let summary = collector.await.map_err(|e| PipelineError::Task {
            stage: Stage::Reading,
            message: e.to_string(),
        })?;

        let written = writer_result?;
        let pool_stats = pool_result?;
        let totals = pool_stats.totals;

        let report = PipelineReport {
            run_id,
            chunks: planned,
            lines_read: totals.lines_read,
            records_emitted: totals.records_emitted,
            records_skipped: totals.records_skipped,
            records_written: written.rows_written,
            batches_flushed: written.batches_flushed,
            parse_errors: totals.parse_errors,
            read_faults: totals.read_faults,
            bytes_unread: totals.bytes_unread,
            errors_by_stage: summary.by_stage,
            error_samples: summary.samples,
            cancelled: cancel.is_cancelled(),
            elapsed: started.elapsed(),
        };

        if report.bytes_unread > 0 {
            warn!(
                read_faults = report.read_faults,
                bytes_unread = report.bytes_unread,
                "Some chunks stopped early, their remaining lines were not ingested"
            );
        }

        if !report.cancelled && written.records_received != report.records_emitted {
            warn!(
                emitted = report.records_emitted,
                received = written.records_received,
                "Writer received a different number of records than workers emitted"
            );
        }

        info!(
            chunks = report.chunks,
            lines = report.lines_read,
            written = report.records_written,
            batches = report.batches_flushed,
            parse_errors = report.parse_errors,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Pipeline finished"
        );

        Ok(report)
    }
}

/// Drain recoverable errors until every sender is gone
async fn collect_errors(
    mut errors: mpsc::Receiver<PipelineError>,
    max_samples: usize,
) -> ErrorSummary {
    let mut summary = ErrorSummary::default();

    while let Some(err) = errors.recv().await {
        warn!(stage = %err.stage(), error = %err, "Recoverable error");
        *summary.by_stage.entry(err.stage()).or_insert(0) += 1;
        if summary.samples.len() < max_samples {
            summary.samples.push(err.to_string());
        }
    }

    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::parser::{EditionParser, ParseError};

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = Pipeline::new(PipelineConfig::new().with_batch_size(0)).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn test_collector_counts_and_caps_samples() {
        let (tx, rx) = mpsc::channel(16);
        for offset in 0..5 {
            tx.send(PipelineError::Parse {
                chunk: 0,
                offset,
                source: ParseError::InvalidField {
                    field: "key",
                    reason: "missing".to_string(),
                },
            })
            .await
            .unwrap();
        }
        tx.send(PipelineError::LineTooLong {
            chunk: 1,
            offset: 99,
            limit: 10,
            unread_bytes: 50,
        })
        .await
        .unwrap();
        drop(tx);

        let summary = collect_errors(rx, 3).await;
        assert_eq!(summary.by_stage.get(&Stage::Parsing), Some(&5));
        assert_eq!(summary.by_stage.get(&Stage::Reading), Some(&1));
        assert_eq!(summary.samples.len(), 3);
        assert!(summary.samples[0].contains("byte 0"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missing_source_fails_before_writing() {
        let pipeline = Pipeline::new(PipelineConfig::new()).unwrap();
        let mut store = crate::store::CountingStore::new();

        let err = pipeline
            .run("/definitely/not/here.txt", EditionParser::new(), &mut store, CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Planning);
        assert_eq!(store.batches(), 0);
    }
}
