//! Core traits for archive reconciliation.
//!
//! This module defines the seams between the orchestrator and the services it
//! drives:
//!
//! - [`SourceCounter`]: Counts rows of a table in the relational source
//! - [`QueryService`]: Asynchronous submit/poll/fetch query service over the archive
//! - [`ArchiveRecordStore`]: Per-archive validation ledger
//! - [`CredentialResolver`]: Resolves secret references into passwords
//! - [`NotificationPublisher`]: Emits per-table completion events
//!
//! # Design Patterns
//!
//! - **Strategy**: Each trait has interchangeable production and in-memory implementations
//! - **Dependency Injection**: The orchestrator holds `Arc<dyn Trait>` values built once per process

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::connection::{ConnectionParams, Secret};
use super::record::{ArchiveRecord, Expected, TableValidation};
use super::value::{QueryState, ResultRows};

/// Count rows of a table in a relational source database.
///
/// Implementations open a scoped connection per call and release it on
/// every exit path. All failures are reported as
/// [`ChecksumError::SourceUnavailable`](crate::error::ChecksumError::SourceUnavailable).
#[async_trait]
pub trait SourceCounter: Send + Sync {
    /// Return `SELECT COUNT(*)` of `table` in the database addressed by `params`.
    async fn count(&self, params: &ConnectionParams, table: &str) -> Result<i64>;
}

/// Asynchronous, eventually-consistent query service reading archived data.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Submit a query; returns the execution id without waiting for results.
    async fn submit(&self, query: &str, output_location: &str) -> Result<String>;

    /// Current state of an execution.
    async fn poll_state(&self, execution_id: &str) -> Result<QueryState>;

    /// Result rows of a succeeded execution, header row first.
    ///
    /// A successful fetch consumes the execution.
    async fn fetch_results(&self, execution_id: &str) -> Result<ResultRows>;

    /// Forget an execution whose outcome will not be fetched.
    async fn discard(&self, _execution_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Persisted archive records and their per-table validation ledger.
///
/// # Conditional updates
///
/// [`update_table_validation`](Self::update_table_validation) is a
/// compare-and-swap keyed by table name: the write only lands if the stored
/// entry still has the state and run id the caller observed.
#[async_trait]
pub trait ArchiveRecordStore: Send + Sync {
    /// Fetch a record, failing with `RecordNotFound` when absent.
    async fn get(&self, archive_id: &str) -> Result<ArchiveRecord>;

    /// Insert or replace a whole record.
    async fn put(&self, record: &ArchiveRecord) -> Result<()>;

    /// Replace the validation entry of `table` if it still matches `expected`.
    ///
    /// Fails with `LedgerConflict` when the stored entry differs and with
    /// `InvalidRecord` when the table is not part of the archive.
    async fn update_table_validation(
        &self,
        archive_id: &str,
        table: &str,
        expected: &Expected,
        validation: &TableValidation,
    ) -> Result<()>;

    /// Backend name for logging.
    fn backend_type(&self) -> &'static str;
}

/// Resolve a secret reference into a plaintext credential.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, secret_ref: &str) -> Result<Secret>;
}

/// Completion signal emitted after each table is reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub archive_id: String,
    pub checksum_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl CompletionEvent {
    pub fn for_table(archive_id: &str, table: &str) -> Self {
        Self {
            archive_id: archive_id.to_string(),
            checksum_complete: true,
            table: Some(table.to_string()),
        }
    }
}

/// Publish completion events to a downstream queue.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, queue: &str, event: &CompletionEvent) -> Result<()>;
}
