//! Chunk planning
//!
//! Splits a source file into contiguous, newline-aligned byte ranges. Each
//! non-final chunk ends on the offset of a `\n` and the next chunk starts on
//! the byte after it, so chunks partition the file with no gap and no
//! overlap and no line is ever split between two workers. The final chunk
//! ends at the file length.
//!
//! ```text
//! 0            2200  2475                   4675  4924            6968
//! |-------------+-----\n--------------------+-----\n--------------|
//! [0, 2475]            [2476, 4924]               [4925, 6968]
//! ```

use memchr::memchr;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Line terminator separating records
pub const LINE_TERMINATOR: u8 = b'\n';

/// A newline-aligned byte range of the source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the plan, starting at 0
    pub index: usize,
    pub source: Arc<Path>,
    /// Offset of the first byte of the first line
    pub start: u64,
    /// Offset of the terminating `\n`, or the file length for the final chunk
    pub end: u64,
}

impl Chunk {
    pub fn span(&self) -> u64 {
        self.end - self.start
    }
}

enum Boundary {
    Found(u64),
    EndOfFile,
    NotFound { searched: u64 },
}

/// Plans chunk boundaries for a source file
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    chunk_size: u64,
    look_ahead: usize,
    max_look_ahead: usize,
}

impl ChunkPlanner {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            look_ahead: config.look_ahead.max(1),
            max_look_ahead: config.max_look_ahead.max(config.look_ahead),
        }
    }

    /// Plan the chunks of `path`
    ///
    /// Fails with [`PipelineError::Source`] when the file cannot be opened,
    /// stat'd or read, and with [`PipelineError::BoundaryNotFound`] when no
    /// line terminator follows a candidate offset within `max_look_ahead`
    /// bytes.
    pub fn plan(&self, path: &Path) -> Result<Vec<Chunk>> {
        let source_err = |source| PipelineError::Source {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(source_err)?;
        let len = file.metadata().map_err(source_err)?.len();
        let source: Arc<Path> = Arc::from(path);

        let mut chunks = Vec::with_capacity(expected_chunks(len, self.chunk_size));
        let mut window = vec![0u8; self.look_ahead];
        let mut start = 0u64;
        let mut candidate = self.chunk_size;

        loop {
            let boundary = if candidate >= len {
                Boundary::EndOfFile
            } else {
                self.find_boundary(&mut file, candidate, &mut window)
                    .map_err(source_err)?
            };

            let end = match boundary {
                Boundary::Found(end) if end + 1 < len => end,
                Boundary::Found(_) | Boundary::EndOfFile => {
                    if start < len || chunks.is_empty() {
                        chunks.push(Chunk {
                            index: chunks.len(),
                            source: Arc::clone(&source),
                            start,
                            end: len,
                        });
                    }
                    break;
                }
                Boundary::NotFound { searched } => {
                    return Err(PipelineError::BoundaryNotFound {
                        offset: candidate,
                        searched,
                    });
                }
            };

            debug!(index = chunks.len(), start, end, "Planned chunk");
            chunks.push(Chunk {
                index: chunks.len(),
                source: Arc::clone(&source),
                start,
                end,
            });

            start = end + 1;
            candidate = end.saturating_add(self.chunk_size);
        }

        info!(
            path = %path.display(),
            bytes = len,
            chunk_size = self.chunk_size,
            chunks = chunks.len(),
            "Planned source file"
        );

        Ok(chunks)
    }

    /// Scan forward from `from` for the next terminator, one window at a time
    fn find_boundary(
        &self,
        file: &mut File,
        from: u64,
        window: &mut [u8],
    ) -> std::io::Result<Boundary> {
        file.seek(SeekFrom::Start(from))?;

        let mut searched = 0u64;
        while searched < self.max_look_ahead as u64 {
            let want = window
                .len()
                .min(self.max_look_ahead - searched as usize);
            let read = read_window(file, &mut window[..want])?;
            if read == 0 {
                return Ok(Boundary::EndOfFile);
            }

            if let Some(i) = memchr(LINE_TERMINATOR, &window[..read]) {
                return Ok(Boundary::Found(from + searched + i as u64));
            }
            searched += read as u64;
        }

        Ok(Boundary::NotFound { searched })
    }
}

/// Plan `path` with the given configuration
pub fn plan(path: impl Into<PathBuf>, config: &PipelineConfig) -> Result<Vec<Chunk>> {
    ChunkPlanner::new(config).plan(&path.into())
}

/// Fill as much of `buf` as the file allows; short only at end of file
fn read_window(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn expected_chunks(len: u64, chunk_size: u64) -> usize {
    usize::try_from(len.div_ceil(chunk_size)).unwrap_or(1).clamp(1, 4096)
}
