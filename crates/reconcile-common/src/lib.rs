//! Reconcile Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the reconcile workspace members:
//!
//! - **Error Handling**: the workspace-wide error and result types
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use reconcile_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> reconcile_common::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{ReconcileError, Result};
