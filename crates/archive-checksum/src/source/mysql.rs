//! MySQL/MariaDB row counter.
//!
//! Opens one SQLx connection per count and closes it before returning.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::Connection;
use tracing::debug;

use super::count_query;
use crate::config::SourceConfig;
use crate::core::{ConnectionParams, EngineKind, SourceCounter};
use crate::error::{ChecksumError, Result};

/// Row counter for MySQL/MariaDB sources.
#[derive(Debug, Clone)]
pub struct MysqlCounter {
    connect_timeout: Duration,
}

impl MysqlCounter {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
        }
    }

    fn connect_options(params: &ConnectionParams) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .database(&params.database)
            .username(&params.username)
            .password(params.password.expose())
            .ssl_mode(MySqlSslMode::Preferred)
    }
}

#[async_trait]
impl SourceCounter for MysqlCounter {
    async fn count(&self, params: &ConnectionParams, table: &str) -> Result<i64> {
        let query = count_query(EngineKind::Mysql, table, None)?;
        let options = Self::connect_options(params);

        let mut conn = tokio::time::timeout(
            self.connect_timeout,
            MySqlConnection::connect_with(&options),
        )
        .await
        .map_err(|_| {
            ChecksumError::source_unavailable(
                table,
                format!(
                    "timed out connecting to MySQL {}:{} after {:?}",
                    params.host, params.port, self.connect_timeout
                ),
            )
        })?
        .map_err(|e| ChecksumError::source_unavailable(table, e))?;

        let result = sqlx::query_scalar::<_, i64>(&query)
            .fetch_one(&mut conn)
            .await;

        // The connection is dropped (and its socket released) on the error path too.
        if let Err(e) = conn.close().await {
            debug!("Failed to close MySQL connection cleanly: {}", e);
        }

        let count = result.map_err(|e| ChecksumError::source_unavailable(table, e))?;
        debug!(
            "MySQL {}:{}/{} table {} has {} rows",
            params.host, params.port, params.database, table, count
        );
        Ok(count)
    }
}
