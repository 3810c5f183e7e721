//! Reconciliation orchestrator - per-archive validation workflow.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{ArchiveFailurePolicy, Config};
use crate::core::{
    ArchiveRecord, ArchiveRecordStore, CompletionEvent, ConnectionParams, CredentialResolver,
    NotificationPublisher, SourceCounter, TableDetail, TableValidation,
};
use crate::credentials;
use crate::error::{ChecksumError, Result};
use crate::ledger::FileArchiveStore;
use crate::notify::FileQueuePublisher;
use crate::query::{ArchiveQueryEngine, ParquetQueryService, PollPolicy};
use crate::source::EngineCounter;

/// Per-run settings that are not collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Queue receiving one completion event per table.
    pub queue: String,
    /// Where the query service writes result sets.
    pub output_location: String,
    /// What to do when the archive count cannot be obtained.
    pub on_failure: ArchiveFailurePolicy,
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        Self {
            queue: config.notification.queue.clone(),
            output_location: config.query.output_location.clone(),
            on_failure: config.query.on_failure,
        }
    }
}

/// Drives the validation of one archive at a time.
pub struct ReconciliationOrchestrator {
    records: Arc<dyn ArchiveRecordStore>,
    credentials: Arc<dyn CredentialResolver>,
    source: Arc<dyn SourceCounter>,
    query: ArchiveQueryEngine,
    publisher: Arc<dyn NotificationPublisher>,
    settings: RunSettings,
}

/// Outcome of one reconciled table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table: String,
    pub source_count: Option<i64>,
    pub s3_count: Option<i64>,
    #[serde(rename = "match")]
    pub matched: bool,
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub archive_id: String,

    /// Unique run identifier stamped on every ledger entry it wrote.
    pub run_id: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-table outcomes in archival order.
    pub tables: Vec<TableOutcome>,
}

impl RunSummary {
    /// Number of tables whose counts matched.
    pub fn matched(&self) -> usize {
        self.tables.iter().filter(|t| t.matched).count()
    }

    /// Names of tables whose counts differ or are unknown.
    pub fn mismatched_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.matched)
            .map(|t| t.table.as_str())
            .collect()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl ReconciliationOrchestrator {
    pub fn new(
        records: Arc<dyn ArchiveRecordStore>,
        credentials: Arc<dyn CredentialResolver>,
        source: Arc<dyn SourceCounter>,
        query: ArchiveQueryEngine,
        publisher: Arc<dyn NotificationPublisher>,
        settings: RunSettings,
    ) -> Self {
        Self {
            records,
            credentials,
            source,
            query,
            publisher,
            settings,
        }
    }

    /// Build the file-backed production wiring described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let records = FileArchiveStore::open(&config.ledger.path).await?;
        let credentials = credentials::from_config(&config.credentials)?;
        let source = EngineCounter::new(&config.source);
        let query = ArchiveQueryEngine::new(
            Arc::new(ParquetQueryService::new(&config.query.data_root)),
            PollPolicy::from(&config.query),
        );
        let publisher = FileQueuePublisher::new(&config.notification.queue_dir);

        info!(
            "Using {} ledger at {:?}, archive data at {:?}",
            records.backend_type(),
            config.ledger.path,
            config.query.data_root
        );

        Ok(Self::new(
            Arc::new(records),
            credentials,
            Arc::new(source),
            query,
            Arc::new(publisher),
            RunSettings::from(config),
        ))
    }

    /// The ledger this orchestrator writes to.
    pub fn records(&self) -> &Arc<dyn ArchiveRecordStore> {
        &self.records
    }

    /// Reconcile every table of an archive, in order.
    ///
    /// The record is loaded, checked and its credential resolved before any
    /// ledger write. Each table is then claimed (`RUNNING`), counted on both
    /// sides, completed and announced. A source failure only blanks the
    /// source count; an archive failure aborts the run under the default
    /// [`ArchiveFailurePolicy::Abort`], leaving the current table `RUNNING`
    /// and later tables untouched.
    pub async fn run(&self, archive_id: &str) -> Result<RunSummary> {
        let started_at = Utc::now();

        let record = self.records.get(archive_id).await?;
        record.ensure_unique_tables()?;
        let password = self.credentials.resolve(&record.secret_arn).await?;
        let params = ConnectionParams::from_record(&record, password);

        let run_id = Uuid::new_v4().to_string();
        info!(
            "Starting validation run {} for archive {} ({} tables, {} source)",
            run_id,
            record.id,
            record.table_details.len(),
            record.database_engine
        );

        let mut tables = Vec::with_capacity(record.table_details.len());
        for detail in &record.table_details {
            match self.reconcile_table(&record, &params, &run_id, detail).await {
                Ok(outcome) => tables.push(outcome),
                Err(e) => {
                    error!(
                        "Run {} for archive {} aborted at table {}: {}",
                        run_id, record.id, detail.table, e
                    );
                    return Err(e);
                }
            }
        }

        let completed_at = Utc::now();
        let summary = RunSummary {
            archive_id: record.id,
            run_id,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables,
        };

        info!(
            "Validation run {} complete: {}/{} tables matched in {:.1}s",
            summary.run_id,
            summary.matched(),
            summary.tables.len(),
            summary.duration_seconds
        );
        Ok(summary)
    }

    async fn reconcile_table(
        &self,
        record: &ArchiveRecord,
        params: &ConnectionParams,
        run_id: &str,
        detail: &TableDetail,
    ) -> Result<TableOutcome> {
        let table = detail.table.as_str();

        let claim = TableValidation::running(run_id);
        self.records
            .update_table_validation(
                &record.id,
                table,
                &detail.checksum_validation.expectation(),
                &claim,
            )
            .await?;

        let source_count = match self.source.count(params, table).await {
            Ok(count) => Some(count),
            Err(e @ ChecksumError::SourceUnavailable { .. }) => {
                warn!("{}: source count unavailable, recording null: {}", table, e);
                None
            }
            Err(e) => return Err(e),
        };

        let s3_count = match self
            .query
            .count(&record.id, &record.database, table, &self.settings.output_location)
            .await
        {
            Ok(count) => Some(count),
            Err(e)
                if e.is_archive_query_failure()
                    && self.settings.on_failure == ArchiveFailurePolicy::RecordNull =>
            {
                warn!("{}: archive count unavailable, recording null: {}", table, e);
                None
            }
            Err(e) => return Err(e),
        };

        let completed = TableValidation::completed(run_id, source_count, s3_count);
        self.records
            .update_table_validation(&record.id, table, &claim.expectation(), &completed)
            .await?;

        self.publisher
            .publish(
                &self.settings.queue,
                &CompletionEvent::for_table(&record.id, table),
            )
            .await?;

        if completed.matched {
            info!("{}: {:?} rows (match)", table, source_count);
        } else {
            info!(
                "{}: source {:?} vs archive {:?} (mismatch)",
                table, source_count, s3_count
            );
        }

        Ok(TableOutcome {
            table: table.to_string(),
            source_count,
            s3_count,
            matched: completed.matched,
        })
    }
}
