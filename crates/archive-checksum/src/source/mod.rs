//! Source database row counters.
//!
//! One [`SourceCounter`] implementation exists per supported engine:
//!
//! - [`MysqlCounter`]: MySQL/MariaDB via SQLx
//! - [`MssqlCounter`]: Microsoft SQL Server via Tiberius
//! - [`OracleCounter`]: Oracle via the Oracle ODBC driver
//!
//! [`SourceCounterImpl`] provides static dispatch over the three, and
//! [`EngineCounter`] picks the variant from the engine recorded on the
//! archive.
//!
//! # Table qualification
//!
//! MySQL and MSSQL count the bare table inside the connected database,
//! quoted with the engine's identifier quoting. Oracle qualifies the table
//! with the schema owner (`OWNER.TABLE`) and leaves both parts unquoted so
//! Oracle's upper-case folding still applies; the parts are therefore
//! restricted to plain identifier characters.

mod mssql;
mod mysql;
mod oracle;

pub use mssql::MssqlCounter;
pub use mysql::MysqlCounter;
pub use oracle::OracleCounter;

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::core::{ConnectionParams, EngineKind, SourceCounter};
use crate::error::{ChecksumError, Result};

/// Quote a MySQL identifier.
fn quote_mysql_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote an MSSQL identifier.
fn quote_mssql_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Validate an unquoted Oracle identifier.
fn oracle_ident<'a>(kind: &str, name: &'a str, table: &str) -> Result<&'a str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#'));
    if valid {
        Ok(name)
    } else {
        Err(ChecksumError::source_unavailable(
            table,
            format!("invalid Oracle {} identifier: '{}'", kind, name),
        ))
    }
}

/// Build the row-count query for `table` on the given engine.
pub fn count_query(engine: EngineKind, table: &str, owner: Option<&str>) -> Result<String> {
    match engine {
        EngineKind::Mysql => Ok(format!("SELECT COUNT(*) FROM {}", quote_mysql_ident(table))),
        EngineKind::Mssql => Ok(format!(
            "SELECT COUNT_BIG(*) FROM {}",
            quote_mssql_ident(table)
        )),
        EngineKind::Oracle => {
            let owner = owner.ok_or_else(|| {
                ChecksumError::source_unavailable(table, "oracle_owner is required for Oracle sources")
            })?;
            let owner = oracle_ident("owner", owner, table)?;
            let name = oracle_ident("table", table, table)?;
            Ok(format!("SELECT COUNT(*) FROM {}.{}", owner, name))
        }
    }
}

/// Enum-based static dispatch over the engine-specific counters.
#[derive(Debug, Clone)]
pub enum SourceCounterImpl {
    Mysql(MysqlCounter),
    Mssql(MssqlCounter),
    Oracle(OracleCounter),
}

impl SourceCounterImpl {
    /// Build the counter for an engine.
    pub fn for_engine(engine: EngineKind, config: &SourceConfig) -> Self {
        match engine {
            EngineKind::Mysql => SourceCounterImpl::Mysql(MysqlCounter::new(config)),
            EngineKind::Mssql => SourceCounterImpl::Mssql(MssqlCounter::new(config)),
            EngineKind::Oracle => SourceCounterImpl::Oracle(OracleCounter::new(config)),
        }
    }

    pub fn engine(&self) -> EngineKind {
        match self {
            SourceCounterImpl::Mysql(_) => EngineKind::Mysql,
            SourceCounterImpl::Mssql(_) => EngineKind::Mssql,
            SourceCounterImpl::Oracle(_) => EngineKind::Oracle,
        }
    }
}

#[async_trait]
impl SourceCounter for SourceCounterImpl {
    async fn count(&self, params: &ConnectionParams, table: &str) -> Result<i64> {
        match self {
            SourceCounterImpl::Mysql(c) => c.count(params, table).await,
            SourceCounterImpl::Mssql(c) => c.count(params, table).await,
            SourceCounterImpl::Oracle(c) => c.count(params, table).await,
        }
    }
}

/// Production counter selecting the engine from the connection parameters.
#[derive(Debug, Clone)]
pub struct EngineCounter {
    mysql: SourceCounterImpl,
    mssql: SourceCounterImpl,
    oracle: SourceCounterImpl,
}

impl EngineCounter {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            mysql: SourceCounterImpl::for_engine(EngineKind::Mysql, config),
            mssql: SourceCounterImpl::for_engine(EngineKind::Mssql, config),
            oracle: SourceCounterImpl::for_engine(EngineKind::Oracle, config),
        }
    }

    fn counter_for(&self, engine: EngineKind) -> &SourceCounterImpl {
        match engine {
            EngineKind::Mysql => &self.mysql,
            EngineKind::Mssql => &self.mssql,
            EngineKind::Oracle => &self.oracle,
        }
    }
}

#[async_trait]
impl SourceCounter for EngineCounter {
    async fn count(&self, params: &ConnectionParams, table: &str) -> Result<i64> {
        self.counter_for(params.engine).count(params, table).await
    }
}
