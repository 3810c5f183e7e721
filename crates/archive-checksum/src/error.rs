//! Error types for archive checksum validation.

use thiserror::Error;

/// Process exit codes reported by the CLI.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_SOURCE_ERROR: u8 = 2;
pub const EXIT_QUERY_ERROR: u8 = 3;
pub const EXIT_RECORD_ERROR: u8 = 4;
pub const EXIT_LEDGER_CONFLICT: u8 = 5;
pub const EXIT_UPSTREAM_ERROR: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for reconciliation operations.
#[derive(Error, Debug)]
pub enum ChecksumError {
    /// Source database connection, authentication or query failure.
    ///
    /// Every failure against the relational source collapses into this
    /// variant; callers cannot tell a missing table from a network outage.
    #[error("Source unavailable for table {table}: {message}")]
    SourceUnavailable { table: String, message: String },

    /// Archive query failed, was cancelled, or returned no usable data.
    #[error("Archive query unavailable for table {table}: {message}")]
    QueryUnavailable { table: String, message: String },

    /// Archive query did not leave the running state within the poll budget.
    #[error("Archive query {execution_id} still running after {attempts} polls")]
    QueryTimeout { execution_id: String, attempts: u32 },

    /// Archive id is unknown to the record store.
    #[error("Archive record not found: {0}")]
    RecordNotFound(String),

    /// Credential, configuration store or queue failure.
    #[error("Upstream failure in {service}: {message}")]
    UpstreamFailure { service: String, message: String },

    /// Conditional ledger write lost against a concurrent writer.
    #[error("Ledger entry for table {table} of archive {archive_id} was modified concurrently")]
    LedgerConflict { archive_id: String, table: String },

    /// Archive record is malformed (duplicate or unknown table names, etc.)
    #[error("Invalid archive record: {0}")]
    InvalidRecord(String),

    /// Configuration error (invalid YAML, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChecksumError {
    /// Create a SourceUnavailable error for a table.
    pub fn source_unavailable(table: impl Into<String>, message: impl ToString) -> Self {
        ChecksumError::SourceUnavailable {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a QueryUnavailable error for a table.
    pub fn query_unavailable(table: impl Into<String>, message: impl ToString) -> Self {
        ChecksumError::QueryUnavailable {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create an UpstreamFailure error naming the failing service.
    pub fn upstream(service: impl Into<String>, message: impl ToString) -> Self {
        ChecksumError::UpstreamFailure {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Whether the orchestrator may absorb this error into a missing count.
    pub fn is_archive_query_failure(&self) -> bool {
        matches!(
            self,
            ChecksumError::QueryUnavailable { .. } | ChecksumError::QueryTimeout { .. }
        )
    }

    /// Exit code for this error when it terminates the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ChecksumError::Config(_) | ChecksumError::Yaml(_) => EXIT_CONFIG_ERROR,
            ChecksumError::SourceUnavailable { .. } => EXIT_SOURCE_ERROR,
            ChecksumError::QueryUnavailable { .. } | ChecksumError::QueryTimeout { .. } => {
                EXIT_QUERY_ERROR
            }
            ChecksumError::RecordNotFound(_)
            | ChecksumError::InvalidRecord(_)
            | ChecksumError::Json(_) => EXIT_RECORD_ERROR,
            ChecksumError::LedgerConflict { .. } => EXIT_LEDGER_CONFLICT,
            ChecksumError::UpstreamFailure { .. } => EXIT_UPSTREAM_ERROR,
            ChecksumError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ChecksumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors() {
        let err = ChecksumError::source_unavailable("orders", "connection refused");
        assert_eq!(
            err.to_string(),
            "Source unavailable for table orders: connection refused"
        );

        let err = ChecksumError::upstream("credentials", "secret missing");
        assert!(matches!(err, ChecksumError::UpstreamFailure { ref service, .. } if service == "credentials"));
    }

    #[test]
    fn test_archive_query_failure_classification() {
        assert!(ChecksumError::query_unavailable("t", "CANCELLED").is_archive_query_failure());
        assert!(ChecksumError::QueryTimeout {
            execution_id: "q-1".into(),
            attempts: 3
        }
        .is_archive_query_failure());
        assert!(!ChecksumError::RecordNotFound("a".into()).is_archive_query_failure());
        assert!(!ChecksumError::source_unavailable("t", "x").is_archive_query_failure());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ChecksumError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.yaml");
        assert_eq!(ChecksumError::from(io).exit_code(), EXIT_IO_ERROR);
        assert_eq!(
            ChecksumError::RecordNotFound("a1".into()).exit_code(),
            EXIT_RECORD_ERROR
        );
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "ledger.json");
        let err = ChecksumError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: ledger.json"));
    }
}
