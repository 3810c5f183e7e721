//! Core abstractions for archive reconciliation.
//!
//! - [`record`]: Archive record and per-table validation ledger types
//! - [`connection`]: Source connection parameters and redacted secrets
//! - [`value`]: Query execution states and typed result cells
//! - [`traits`]: Seams to the source databases, query service, ledger, secrets and queue
//!
//! Driver modules (`source`, `query`, `ledger`, `notify`, `credentials`)
//! implement these traits; the orchestrator only depends on this module.

pub mod connection;
pub mod record;
pub mod traits;
pub mod value;

pub use connection::{ConnectionParams, Secret};
pub use record::{
    counts_match, ArchiveRecord, EngineKind, Expected, TableDetail, TableValidation,
    ValidationState,
};
pub use traits::{
    ArchiveRecordStore, CompletionEvent, CredentialResolver, NotificationPublisher, QueryService,
    SourceCounter,
};
pub use value::{CellValue, QueryExecution, QueryState, ResultRows};
