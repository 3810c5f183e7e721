//! Source connection parameters and redacted secrets.

use std::fmt;

use super::record::{ArchiveRecord, EngineKind};

/// A plaintext credential that never prints its value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the plaintext value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Everything a source counter needs to reach one database.
#[derive(Clone, Debug)]
pub struct ConnectionParams {
    pub engine: EngineKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    /// Database name; the service name for Oracle.
    pub database: String,
    /// Schema owner qualifying Oracle tables.
    pub owner: Option<String>,
}

impl ConnectionParams {
    /// Build parameters from an archive record and its resolved password.
    pub fn from_record(record: &ArchiveRecord, password: Secret) -> Self {
        Self {
            engine: record.database_engine,
            host: record.hostname.clone(),
            port: record.port,
            username: record.username.clone(),
            password,
            database: record.database.clone(),
            owner: record.oracle_owner.clone(),
        }
    }

    /// Oracle-style connect descriptor `//host:port/service`.
    pub fn oracle_dsn(&self) -> String {
        format!("//{}:{}/{}", self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::TableDetail;

    #[test]
    fn test_secret_debug_redacts_value() {
        let secret = Secret::new("super_secret_password_123");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose(), "super_secret_password_123");
    }

    #[test]
    fn test_connection_params_debug_redacts_password() {
        let record = ArchiveRecord {
            id: "a1".into(),
            database_engine: EngineKind::Oracle,
            hostname: "ora.internal".into(),
            port: 1521,
            username: "archiver".into(),
            secret_arn: "ref".into(),
            database: "ORCLPDB1".into(),
            oracle_owner: Some("DMS_SAMPLE".into()),
            table_details: vec![TableDetail::new("ORDERS")],
        };
        let params = ConnectionParams::from_record(&record, Secret::new("hunter2"));

        let debug_output = format!("{:?}", params);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
        assert_eq!(params.owner.as_deref(), Some("DMS_SAMPLE"));
        assert_eq!(params.oracle_dsn(), "//ora.internal:1521/ORCLPDB1");
    }
}
