//! Oracle row counter over ODBC.
//!
//! **Requirements:** an Oracle ODBC driver (Oracle Instant Client ODBC
//! package) registered with the system driver manager under the name
//! configured as `source.oracle_odbc_driver`.
//!
//! One ODBC environment is created on first use and shared by every count.
//! ODBC calls block, so each count runs on Tokio's blocking pool with its own
//! connection, dropped before the task returns.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment};
use tokio::sync::OnceCell;
use tracing::debug;

use super::count_query;
use crate::config::SourceConfig;
use crate::core::{ConnectionParams, EngineKind, SourceCounter};
use crate::error::{ChecksumError, Result};

/// Row counter for Oracle sources.
#[derive(Clone)]
pub struct OracleCounter {
    env: Arc<OnceCell<Arc<Environment>>>,
    driver: String,
    login_timeout_secs: u32,
}

impl fmt::Debug for OracleCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleCounter")
            .field("driver", &self.driver)
            .field("login_timeout_secs", &self.login_timeout_secs)
            .field("env_initialized", &self.env.initialized())
            .finish()
    }
}

/// Brace-quote an ODBC connection string attribute value.
fn odbc_value(value: &str) -> String {
    format!("{{{}}}", value.replace('}', "}}"))
}

impl OracleCounter {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            env: Arc::new(OnceCell::new()),
            driver: config.oracle_odbc_driver.clone(),
            login_timeout_secs: u32::try_from(config.connect_timeout_secs).unwrap_or(u32::MAX),
        }
    }

    async fn environment(&self, table: &str) -> Result<Arc<Environment>> {
        self.env
            .get_or_try_init(|| async {
                debug!("Creating ODBC environment");
                Environment::new().map(Arc::new).map_err(|e| {
                    ChecksumError::source_unavailable(
                        table,
                        format!("failed to create ODBC environment: {}", e),
                    )
                })
            })
            .await
            .cloned()
    }

    fn connection_string(&self, params: &ConnectionParams) -> String {
        format!(
            "Driver={};Dbq={};Uid={};Pwd={};",
            odbc_value(&self.driver),
            params.oracle_dsn(),
            odbc_value(&params.username),
            odbc_value(params.password.expose()),
        )
    }

    fn count_blocking(
        env: &Environment,
        connection_string: &str,
        login_timeout_secs: u32,
        sql: &str,
        table: &str,
    ) -> Result<i64> {
        let options = ConnectionOptions {
            login_timeout_sec: Some(login_timeout_secs),
            ..ConnectionOptions::default()
        };
        let conn = env
            .connect_with_connection_string(connection_string, options)
            .map_err(|e| ChecksumError::source_unavailable(table, e))?;

        let mut cursor = conn
            .execute(sql, ())
            .map_err(|e| ChecksumError::source_unavailable(table, e))?
            .ok_or_else(|| ChecksumError::source_unavailable(table, "count query returned no result set"))?;

        let mut buffers = TextRowSet::for_cursor(1, &mut cursor, Some(64))
            .map_err(|e| ChecksumError::source_unavailable(table, e))?;
        let mut row_cursor = cursor
            .bind_buffer(&mut buffers)
            .map_err(|e| ChecksumError::source_unavailable(table, e))?;

        let batch = row_cursor
            .fetch()
            .map_err(|e| ChecksumError::source_unavailable(table, e))?
            .ok_or_else(|| ChecksumError::source_unavailable(table, "count query returned no rows"))?;

        let text = batch
            .at(0, 0)
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
            .ok_or_else(|| ChecksumError::source_unavailable(table, "count query returned NULL"))?;

        text.trim().parse::<i64>().map_err(|e| {
            ChecksumError::source_unavailable(table, format!("invalid count '{}': {}", text, e))
        })
    }
}

#[async_trait]
impl SourceCounter for OracleCounter {
    async fn count(&self, params: &ConnectionParams, table: &str) -> Result<i64> {
        let sql = count_query(EngineKind::Oracle, table, params.owner.as_deref())?;
        let env = self.environment(table).await?;
        let connection_string = self.connection_string(params);
        let login_timeout_secs = self.login_timeout_secs;
        let table_name = table.to_string();

        debug!(
            "Counting Oracle table via ODBC: Dbq={};Query={}",
            params.oracle_dsn(),
            sql
        );

        let count = tokio::task::spawn_blocking(move || {
            Self::count_blocking(&env, &connection_string, login_timeout_secs, &sql, &table_name)
        })
        .await
        .map_err(|e| ChecksumError::source_unavailable(table, format!("ODBC task failed: {}", e)))??;

        debug!("Oracle {} table {} has {} rows", params.oracle_dsn(), table, count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Secret;

    fn params() -> ConnectionParams {
        ConnectionParams {
            engine: EngineKind::Oracle,
            host: "ora.internal".into(),
            port: 1521,
            username: "archiver".into(),
            password: Secret::new("p;w}d"),
            database: "ORCLPDB1".into(),
            owner: Some("DMS_SAMPLE".into()),
        }
    }

    #[test]
    fn test_connection_string() {
        let counter = OracleCounter::new(&SourceConfig::default());
        let conn_str = counter.connection_string(&params());
        assert_eq!(
            conn_str,
            "Driver={Oracle 21 ODBC driver};Dbq=//ora.internal:1521/ORCLPDB1;Uid={archiver};Pwd={p;w}}d};"
        );
    }

    #[test]
    fn test_login_timeout_from_config() {
        let config = SourceConfig {
            connect_timeout_secs: 12,
            ..SourceConfig::default()
        };
        assert_eq!(OracleCounter::new(&config).login_timeout_secs, 12);
    }

    #[tokio::test]
    async fn test_missing_owner_fails_before_connecting() {
        let counter = OracleCounter::new(&SourceConfig::default());
        let mut params = params();
        params.owner = None;

        let err = counter.count(&params, "ORDERS").await.unwrap_err();
        assert!(matches!(err, ChecksumError::SourceUnavailable { .. }));
        assert!(!counter.env.initialized());
    }

    #[test]
    fn test_clones_share_environment() {
        let counter = OracleCounter::new(&SourceConfig::default());
        let clone = counter.clone();
        assert!(Arc::ptr_eq(&counter.env, &clone.env));
    }
}
