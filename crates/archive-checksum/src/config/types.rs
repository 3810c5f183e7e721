//! Configuration type definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Validation ledger location.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Where source passwords come from.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Archive query service and polling behavior.
    #[serde(default)]
    pub query: QueryConfig,

    /// Completion notification queue.
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Source database connection behavior.
    #[serde(default)]
    pub source: SourceConfig,
}

/// File-backed ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding one `<archive_id>.json` document per archive.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Credential resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Prefix for environment variables holding passwords.
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// YAML file mapping secret references to passwords. Takes precedence
    /// over the environment when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            env_prefix: default_env_prefix(),
            file: None,
        }
    }
}

/// What to do when the archive-side count cannot be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFailurePolicy {
    /// Abort the run, leaving the remaining tables untouched.
    #[default]
    Abort,
    /// Record a missing archive count and continue, like source failures.
    RecordNull,
}

/// Archive query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Root directory of the archived columnar data.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Staging location for query results.
    #[serde(default = "default_output_location")]
    pub output_location: String,

    /// Delay before each state poll, in milliseconds (default: 2000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of polls. Unbounded when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_poll_attempts: Option<u32>,

    /// Behavior on archive query failure (default: abort).
    #[serde(default)]
    pub on_failure: ArchiveFailurePolicy,
}

impl QueryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            output_location: default_output_location(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: None,
            on_failure: ArchiveFailurePolicy::default(),
        }
    }
}

/// Notification queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Queue name completion events are published to.
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Directory holding `<queue>.jsonl` files.
    #[serde(default = "default_queue_dir")]
    pub queue_dir: PathBuf,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            queue_dir: default_queue_dir(),
        }
    }
}

/// Source database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Connection timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Require TLS for MSSQL connections (default: false).
    #[serde(default)]
    pub mssql_encrypt: bool,

    /// Trust the server certificate without validation (default: true).
    #[serde(default = "default_true")]
    pub trust_server_cert: bool,

    /// ODBC driver name used for Oracle sources.
    #[serde(default = "default_oracle_driver")]
    pub oracle_odbc_driver: String,
}

impl SourceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            mssql_encrypt: false,
            trust_server_cert: true,
            oracle_odbc_driver: default_oracle_driver(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("ledger")
}

fn default_env_prefix() -> String {
    "ARCHIVE_SECRET_".to_string()
}

fn default_data_root() -> PathBuf {
    PathBuf::from("archive")
}

fn default_output_location() -> String {
    "query-results".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_queue() -> String {
    "validation".to_string()
}

fn default_queue_dir() -> PathBuf {
    PathBuf::from("queues")
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_oracle_driver() -> String {
    "Oracle 21 ODBC driver".to_string()
}
