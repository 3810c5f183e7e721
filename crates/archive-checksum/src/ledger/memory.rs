//! In-memory archive record store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::apply_update;
use crate::core::{ArchiveRecord, ArchiveRecordStore, Expected, TableValidation};
use crate::error::{ChecksumError, Result};

/// Archive records held in process memory.
#[derive(Default)]
pub struct MemoryArchiveStore {
    records: RwLock<HashMap<String, ArchiveRecord>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = ArchiveRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }
}

#[async_trait]
impl ArchiveRecordStore for MemoryArchiveStore {
    async fn get(&self, archive_id: &str) -> Result<ArchiveRecord> {
        self.records
            .read()
            .await
            .get(archive_id)
            .cloned()
            .ok_or_else(|| ChecksumError::RecordNotFound(archive_id.to_string()))
    }

    async fn put(&self, record: &ArchiveRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_table_validation(
        &self,
        archive_id: &str,
        table: &str,
        expected: &Expected,
        validation: &TableValidation,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(archive_id)
            .ok_or_else(|| ChecksumError::RecordNotFound(archive_id.to_string()))?;
        apply_update(record, table, expected, validation)
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
