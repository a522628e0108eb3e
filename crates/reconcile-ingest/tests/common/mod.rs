//! Shared fixtures for reconcile-ingest integration tests
//!
//! Dumps are synthesised on disk with `tempfile` so every test owns its
//! source file. [`RecordingStore`] captures flushed batches for inspection.

#![allow(dead_code)]

use async_trait::async_trait;
use reconcile_ingest::{BatchStore, Edition, StoreError};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

/// A qualifying edition line with only an ISBN-10
pub fn edition_line(n: usize) -> String {
    format!(
        "/type/edition\t/books/OL{n}M\t3\t2021-03-01T10:00:00.000000\t{{\"key\": \"/books/OL{n}M\", \"ocaid\": \"ia{n}\", \"isbn_10\": [\"0141439513\"]}}"
    )
}

/// A well-formed line of another record type
pub fn author_line(n: usize) -> String {
    format!(
        "/type/author\t/authors/OL{n}A\t1\t2021-03-01T10:00:00.000000\t{{\"key\": \"/authors/OL{n}A\", \"name\": \"Author {n}\"}}"
    )
}

/// An edition line whose JSON payload is cut short
pub fn malformed_line(n: usize) -> String {
    format!("/type/edition\t/books/OL{n}M\t3\t2021-03-01T10:00:00.000000\t{{\"key\": \"/books/OL{n}M\", ")
}

pub fn write_dump(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create dump");
    for line in lines {
        writeln!(file, "{}", line).expect("write dump line");
    }
    file.flush().expect("flush dump");
    file
}

/// `editions` qualifying lines with an author line after every second one
pub fn mixed_dump(editions: usize) -> (NamedTempFile, usize) {
    let mut lines = Vec::new();
    let mut authors = 0;
    for n in 0..editions {
        lines.push(edition_line(n));
        if n % 2 == 1 {
            lines.push(author_line(n));
            authors += 1;
        }
    }
    (write_dump(&lines), authors)
}

/// `len` bytes of filler with `\n` at exactly the given offsets
pub fn file_with_newlines(len: usize, newlines: &[usize]) -> NamedTempFile {
    let mut bytes = vec![b'x'; len];
    for &pos in newlines {
        bytes[pos] = b'\n';
    }
    let mut file = NamedTempFile::new().expect("create file");
    file.write_all(&bytes).expect("write file");
    file
}

pub fn expected_olids(editions: usize) -> Vec<String> {
    let mut olids: Vec<String> = (0..editions).map(|n| format!("OL{n}M")).collect();
    olids.sort();
    olids
}

/// In-memory store recording every flushed batch
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub batches: Arc<Mutex<Vec<Vec<Edition>>>>,
    /// Fail the flush with this index
    pub fail_at: Option<usize>,
    /// Cancel this token once the first batch has been written
    pub cancel_after_first: Option<CancellationToken>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(flush: usize) -> Self {
        Self {
            fail_at: Some(flush),
            ..Self::default()
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn sorted_olids(&self) -> Vec<String> {
        let mut olids: Vec<String> = self
            .batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|e| e.olid.clone())
            .collect();
        olids.sort();
        olids
    }
}

#[async_trait]
impl BatchStore<Edition> for RecordingStore {
    async fn write_batch(&mut self, records: &[Edition]) -> Result<u64, StoreError> {
        let mut batches = self.batches.lock().unwrap();
        if self.fail_at == Some(batches.len()) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        batches.push(records.to_vec());

        if let Some(cancel) = &self.cancel_after_first {
            cancel.cancel();
        }
        Ok(records.len() as u64)
    }
}
