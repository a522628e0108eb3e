//! Reconcile Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Parallel, chunked ingest of large line-oriented dump files.
//!
//! # Stages
//!
//! - **Planner**: splits the file into newline-aligned chunks
//! - **Workers**: scan chunks in parallel and parse each line
//! - **Writer**: groups records into fixed-size batches and flushes them
//!   to a [`store::BatchStore`]
//!
//! Parsed records only travel over bounded channels; a pipeline with one
//! worker is a plain sequential scan.
//!
//! # Example
//!
//! ```no_run
//! use reconcile_ingest::{EditionParser, Pipeline, PipelineConfig, SqliteStore, StoreConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut store = SqliteStore::connect(&StoreConfig::from_env()).await?;
//!     let pipeline = Pipeline::new(PipelineConfig::from_env())?;
//!
//!     let report = pipeline
//!         .run("ol_dump.txt", EditionParser::new(), &mut store, CancellationToken::new())
//!         .await?;
//!     println!("{} editions written", report.records_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod planner;
pub mod pool;
pub mod store;
pub mod worker;
pub mod writer;

pub use config::{PipelineConfig, StoreConfig};
pub use error::{PipelineError, Result, Stage};
pub use parser::{Edition, EditionParser, LineParser, ParseError, Parsed, SkipReason};
pub use pipeline::{Pipeline, PipelineReport};
pub use planner::{Chunk, ChunkPlanner};
pub use store::{BatchStore, CountingStore, SqliteRow, SqliteStore, StoreError};
