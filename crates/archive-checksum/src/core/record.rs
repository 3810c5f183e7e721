//! Archive record and per-table validation ledger types.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChecksumError, Result};

/// Source database engine of an archive.
///
/// Serialized in lowercase; deserialization accepts every alias [`FromStr`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum EngineKind {
    Mysql,
    Mssql,
    Oracle,
}

impl EngineKind {
    /// Lowercase engine name as stored in archive records.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Mysql => "mysql",
            EngineKind::Mssql => "mssql",
            EngineKind::Oracle => "oracle",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(EngineKind::Mysql),
            "mssql" | "sqlserver" | "sql_server" => Ok(EngineKind::Mssql),
            "oracle" => Ok(EngineKind::Oracle),
            other => Err(ChecksumError::Config(format!(
                "Unknown database engine: '{}'. Supported engines: mysql, mssql, oracle",
                other
            ))),
        }
    }
}

impl TryFrom<String> for EngineKind {
    type Error = ChecksumError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Validation state of one archived table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationState::Pending => "PENDING",
            ValidationState::Running => "RUNNING",
            ValidationState::Completed => "COMPLETED",
            ValidationState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Row-count validation result for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TableValidation {
    /// Validation state.
    #[serde(default)]
    pub state: ValidationState,

    /// Row count in the relational source, if it could be obtained.
    #[serde(default)]
    pub source_count: Option<i64>,

    /// Row count in the archived copy, if it could be obtained.
    #[serde(default)]
    pub s3_count: Option<i64>,

    /// True iff both counts are present and equal.
    #[serde(default, rename = "match")]
    pub matched: bool,

    /// Run that last claimed or completed this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl TableValidation {
    /// Entry claimed by a run that is about to count the table.
    pub fn running(run_id: &str) -> Self {
        Self {
            state: ValidationState::Running,
            source_count: None,
            s3_count: None,
            matched: false,
            run_id: Some(run_id.to_string()),
        }
    }

    /// Completed entry with the match flag derived from both counts.
    pub fn completed(run_id: &str, source_count: Option<i64>, s3_count: Option<i64>) -> Self {
        Self {
            state: ValidationState::Completed,
            source_count,
            s3_count,
            matched: counts_match(source_count, s3_count),
            run_id: Some(run_id.to_string()),
        }
    }

    /// Precondition a conditional write must observe to replace this entry.
    pub fn expectation(&self) -> Expected {
        Expected {
            state: self.state,
            run_id: self.run_id.clone(),
        }
    }
}

/// Compare-and-swap precondition on a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    pub state: ValidationState,
    pub run_id: Option<String>,
}

impl Expected {
    /// Whether the stored entry still satisfies this precondition.
    pub fn matches(&self, current: &TableValidation) -> bool {
        self.state == current.state && self.run_id == current.run_id
    }
}

/// Two counts match only when both are known and equal.
pub fn counts_match(source_count: Option<i64>, s3_count: Option<i64>) -> bool {
    matches!((source_count, s3_count), (Some(s), Some(a)) if s == a)
}

/// One table of an archive together with its validation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDetail {
    /// Table name in the source database.
    pub table: String,

    #[serde(default)]
    pub checksum_validation: TableValidation,
}

impl TableDetail {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            checksum_validation: TableValidation::default(),
        }
    }
}

/// Archived dataset as created by the archival pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub id: String,

    pub database_engine: EngineKind,

    pub hostname: String,

    pub port: u16,

    pub username: String,

    /// Reference to the secret holding the source password.
    pub secret_arn: String,

    pub database: String,

    /// Schema owner used to qualify Oracle tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle_owner: Option<String>,

    /// Tables in archival order.
    #[serde(default)]
    pub table_details: Vec<TableDetail>,
}

impl ArchiveRecord {
    /// Look up a table entry by name.
    pub fn table(&self, name: &str) -> Option<&TableDetail> {
        self.table_details.iter().find(|t| t.table == name)
    }

    /// Mutable lookup of a table entry by name.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableDetail> {
        self.table_details.iter_mut().find(|t| t.table == name)
    }

    /// Reject records whose table names are not unique.
    ///
    /// Ledger updates are addressed by table name, so a duplicate would make
    /// two entries indistinguishable.
    pub fn ensure_unique_tables(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.table_details.len());
        for detail in &self.table_details {
            if !seen.insert(detail.table.as_str()) {
                return Err(ChecksumError::InvalidRecord(format!(
                    "archive {} lists table '{}' more than once",
                    self.id, detail.table
                )));
            }
        }
        Ok(())
    }
}
