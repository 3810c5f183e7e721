//! File-backed archive record store.
//!
//! Each archive lives in `<dir>/<archive_id>.json`. Writes go to a temporary
//! file that is renamed over the document, so readers never observe a
//! partial record. Read-modify-write cycles are serialized by an async mutex
//! within one process; every update re-reads the document before checking
//! its precondition.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::apply_update;
use crate::core::{ArchiveRecord, ArchiveRecordStore, Expected, TableValidation};
use crate::error::{ChecksumError, Result};

/// Directory of JSON archive records.
pub struct FileArchiveStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileArchiveStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, archive_id: &str) -> Result<PathBuf> {
        if archive_id.is_empty()
            || archive_id.contains(['/', '\\'])
            || archive_id.starts_with('.')
        {
            return Err(ChecksumError::InvalidRecord(format!(
                "archive id '{}' cannot be used as a file name",
                archive_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", archive_id)))
    }

    async fn read(&self, archive_id: &str) -> Result<ArchiveRecord> {
        let path = self.record_path(archive_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChecksumError::RecordNotFound(archive_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn write(&self, record: &ArchiveRecord) -> Result<()> {
        let path = self.record_path(&record.id)?;
        let content = serde_json::to_string_pretty(record)?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Wrote archive record {:?}", path);
        Ok(())
    }
}

#[async_trait]
impl ArchiveRecordStore for FileArchiveStore {
    async fn get(&self, archive_id: &str) -> Result<ArchiveRecord> {
        self.read(archive_id).await
    }

    async fn put(&self, record: &ArchiveRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(record).await
    }

    async fn update_table_validation(
        &self,
        archive_id: &str,
        table: &str,
        expected: &Expected,
        validation: &TableValidation,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read(archive_id).await?;
        apply_update(&mut record, table, expected, validation)?;
        self.write(&record).await
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
