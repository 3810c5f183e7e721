//! MSSQL row counter.
//!
//! Uses a single Tiberius client per count over a Tokio TCP stream.

use std::time::Duration;

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::count_query;
use crate::config::SourceConfig;
use crate::core::{ConnectionParams, EngineKind, SourceCounter};
use crate::error::{ChecksumError, Result};

type MssqlClient = Client<Compat<TcpStream>>;

/// Row counter for Microsoft SQL Server sources.
#[derive(Debug, Clone)]
pub struct MssqlCounter {
    connect_timeout: Duration,
    encrypt: bool,
    trust_server_cert: bool,
}

impl MssqlCounter {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            encrypt: config.mssql_encrypt,
            trust_server_cert: config.trust_server_cert,
        }
    }

    fn build_config(&self, params: &ConnectionParams) -> Config {
        let mut config = Config::new();
        config.host(&params.host);
        config.port(params.port);
        config.database(&params.database);
        config.authentication(AuthMethod::sql_server(
            &params.username,
            params.password.expose(),
        ));

        if self.encrypt {
            if self.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }

    async fn connect(&self, params: &ConnectionParams) -> std::result::Result<MssqlClient, String> {
        let config = self.build_config(params);
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| e.to_string())?;
        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| e.to_string())
    }

    async fn query_row(client: &mut MssqlClient, query: &str) -> tiberius::Result<Option<Row>> {
        client.simple_query(query).await?.into_row().await
    }
}

#[async_trait]
impl SourceCounter for MssqlCounter {
    async fn count(&self, params: &ConnectionParams, table: &str) -> Result<i64> {
        let query = count_query(EngineKind::Mssql, table, None)?;

        let mut client = tokio::time::timeout(self.connect_timeout, self.connect(params))
            .await
            .map_err(|_| {
                ChecksumError::source_unavailable(
                    table,
                    format!(
                        "timed out connecting to MSSQL {}:{} after {:?}",
                        params.host, params.port, self.connect_timeout
                    ),
                )
            })?
            .map_err(|e| ChecksumError::source_unavailable(table, e))?;

        let result = Self::query_row(&mut client, &query).await;

        if let Err(e) = client.close().await {
            debug!("Failed to close MSSQL connection cleanly: {}", e);
        }

        let row = result.map_err(|e| ChecksumError::source_unavailable(table, e))?;
        let count = row
            .map(|r| r.try_get::<i64, _>(0))
            .transpose()
            .map_err(|e| ChecksumError::source_unavailable(table, e))?
            .flatten()
            .ok_or_else(|| ChecksumError::source_unavailable(table, "COUNT_BIG returned no value"))?;

        debug!(
            "MSSQL {}:{}/{} table {} has {} rows",
            params.host, params.port, params.database, table, count
        );
        Ok(count)
    }
}
