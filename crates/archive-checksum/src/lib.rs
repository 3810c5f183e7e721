//! # archive-checksum
//!
//! Row-count reconciliation between relational source databases and their
//! archived copies.
//!
//! For every table of an archive this library:
//!
//! - **Counts source rows** on MySQL, SQL Server or Oracle
//! - **Counts archived rows** through an asynchronous query service
//! - **Records the result** in a per-archive validation ledger
//! - **Announces completion** on a downstream queue
//!
//! ## Example
//!
//! ```rust,no_run
//! use archive_checksum::{Config, ReconciliationOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> archive_checksum::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = ReconciliationOrchestrator::from_config(&config).await?;
//!     let summary = orchestrator.run("a1").await?;
//!     println!("{} of {} tables matched", summary.matched(), summary.tables.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod credentials;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod notify;
pub mod orchestrator;
pub mod query;
pub mod source;

// Re-exports for convenient access
pub use config::{ArchiveFailurePolicy, Config};
pub use core::{ArchiveRecord, ArchiveRecordStore, EngineKind, TableValidation, ValidationState};
pub use error::{ChecksumError, Result};
pub use handler::{handle_invocation, InvocationResponse};
pub use ledger::{FileArchiveStore, MemoryArchiveStore};
pub use orchestrator::{ReconciliationOrchestrator, RunSettings, RunSummary, TableOutcome};
pub use query::{ArchiveQueryEngine, ParquetQueryService, PollPolicy};
pub use source::EngineCounter;
