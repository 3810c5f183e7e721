//! Validation ledger storage.
//!
//! The [`ArchiveRecordStore`](crate::core::ArchiveRecordStore) trait is
//! implemented by:
//!
//! - **File**: [`FileArchiveStore`], one JSON document per archive
//! - **Memory**: [`MemoryArchiveStore`], for embedding and tests
//!
//! Both apply conditional updates through [`apply_update`], keyed by table
//! name rather than position.

mod file;
mod memory;

pub use file::FileArchiveStore;
pub use memory::MemoryArchiveStore;

use crate::core::{ArchiveRecord, Expected, TableValidation};
use crate::error::{ChecksumError, Result};

/// Compare-and-swap one table entry of a record in place.
pub fn apply_update(
    record: &mut ArchiveRecord,
    table: &str,
    expected: &Expected,
    validation: &TableValidation,
) -> Result<()> {
    let archive_id = record.id.clone();
    let detail = record.table_mut(table).ok_or_else(|| {
        ChecksumError::InvalidRecord(format!(
            "archive {} has no table named '{}'",
            archive_id, table
        ))
    })?;

    if !expected.matches(&detail.checksum_validation) {
        return Err(ChecksumError::LedgerConflict {
            archive_id,
            table: table.to_string(),
        });
    }

    detail.checksum_validation = validation.clone();
    Ok(())
}
