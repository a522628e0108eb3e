//! Chunk worker
//!
//! Scans one chunk line by line with its own read handle and hands each line
//! to the parser. Records go to the record sink, recoverable errors to the
//! error sink; nothing is returned to the caller. A read fault or an
//! oversized line ends the current chunk only.
//!
//! Both sinks are bounded and sent to with `blocking_send`, so a worker must
//! run on a blocking thread (`spawn_blocking`), never on an async task.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::parser::{LineParser, Parsed};
use crate::planner::{Chunk, LINE_TERMINATOR};

/// Per-worker counters, returned when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub chunks_processed: usize,
    pub lines_read: u64,
    pub records_emitted: u64,
    pub records_skipped: u64,
    pub parse_errors: u64,
    pub read_faults: u64,
    pub bytes_unread: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.chunks_processed += other.chunks_processed;
        self.lines_read += other.lines_read;
        self.records_emitted += other.records_emitted;
        self.records_skipped += other.records_skipped;
        self.parse_errors += other.parse_errors;
        self.read_faults += other.read_faults;
        self.bytes_unread += other.bytes_unread;
    }
}

/// Processes chunks one at a time
pub struct ChunkWorker<P: LineParser> {
    id: usize,
    parser: Arc<P>,
    cancel: CancellationToken,
    max_line_len: usize,
    read_buffer: usize,
    stats: WorkerStats,
}

impl<P: LineParser> ChunkWorker<P> {
    pub fn new(
        id: usize,
        parser: Arc<P>,
        config: &PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            parser,
            cancel,
            max_line_len: config.max_line_len,
            read_buffer: config.read_buffer,
            stats: WorkerStats::default(),
        }
    }

    pub fn into_stats(self) -> WorkerStats {
        self.stats
    }

    /// Scan `chunk` to completion, cancellation or a fault
    ///
    /// Stops early, without error, when the record sink has been closed.
    pub fn process(
        &mut self,
        chunk: &Chunk,
        records: &mpsc::Sender<P::Record>,
        errors: &mpsc::Sender<PipelineError>,
    ) {
        self.stats.chunks_processed += 1;

        let mut reader = match self.open(chunk) {
            Ok(reader) => reader,
            Err(source) => {
                self.fault(
                    errors,
                    PipelineError::Read {
                        chunk: chunk.index,
                        offset: chunk.start,
                        unread_bytes: chunk.span(),
                        source,
                    },
                );
                return;
            }
        };

        // Offset of the first byte of the next line. A line starting past
        // `chunk.end` belongs to the next chunk.
        let mut offset = chunk.start;
        let limit = self.max_line_len as u64 + 1;
        let mut line = Vec::with_capacity(256);
        let before = self.stats;

        while offset <= chunk.end {
            if self.cancel.is_cancelled() {
                debug!(worker = self.id, chunk = chunk.index, offset, "Chunk cancelled");
                break;
            }

            line.clear();
            let read = match (&mut reader).take(limit).read_until(LINE_TERMINATOR, &mut line) {
                Ok(read) => read,
                Err(source) => {
                    self.fault(
                        errors,
                        PipelineError::Read {
                            chunk: chunk.index,
                            offset,
                            unread_bytes: chunk.end.saturating_sub(offset),
                            source,
                        },
                    );
                    return;
                }
            };
            if read == 0 {
                break;
            }

            if line.last() == Some(&LINE_TERMINATOR) {
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
            } else if read as u64 == limit {
                self.fault(
                    errors,
                    PipelineError::LineTooLong {
                        chunk: chunk.index,
                        offset,
                        limit: self.max_line_len,
                        unread_bytes: chunk.end.saturating_sub(offset),
                    },
                );
                return;
            }

            let line_start = offset;
            offset += read as u64;
            self.stats.lines_read += 1;

            match self.parser.parse_line(&line) {
                Ok(Parsed::Record(record)) => {
                    if records.blocking_send(record).is_err() {
                        debug!(worker = self.id, chunk = chunk.index, "Record sink closed");
                        return;
                    }
                    self.stats.records_emitted += 1;
                }
                Ok(Parsed::NotApplicable(reason)) => {
                    trace!(offset = line_start, ?reason, "Skipped line");
                    self.stats.records_skipped += 1;
                }
                Err(source) => {
                    self.stats.parse_errors += 1;
                    report(
                        errors,
                        PipelineError::Parse {
                            chunk: chunk.index,
                            offset: line_start,
                            source,
                        },
                    );
                }
            }
        }

        debug!(
            worker = self.id,
            chunk = chunk.index,
            lines = self.stats.lines_read - before.lines_read,
            records = self.stats.records_emitted - before.records_emitted,
            "Chunk done"
        );
    }

    fn open(&self, chunk: &Chunk) -> std::io::Result<BufReader<File>> {
        let mut reader = BufReader::with_capacity(self.read_buffer, File::open(&chunk.source)?);
        reader.seek(SeekFrom::Start(chunk.start))?;
        Ok(reader)
    }

    fn fault(&mut self, errors: &mpsc::Sender<PipelineError>, err: PipelineError) {
        self.stats.read_faults += 1;
        self.stats.bytes_unread += err.unread_bytes();
        report(errors, err);
    }
}

fn report(errors: &mpsc::Sender<PipelineError>, err: PipelineError) {
    if let Err(mpsc::error::SendError(err)) = errors.blocking_send(err) {
        warn!(error = %err, "Error sink closed, dropping error");
    }
}
