//! Archive-side row counting through an asynchronous query service.
//!
//! The archived copy of a source table is exposed by the query catalog as
//! `"{archive}-{database}-database"."{archive}-{database}-{table}-table"`.
//! [`ArchiveQueryEngine`] submits a `COUNT(*)` against that object, polls the
//! execution until it settles, and reads the scalar from the result set
//! (row 0 is the header, the count sits at row 1, column 0).

pub mod local;

pub use local::ParquetQueryService;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::QueryConfig;
use crate::core::{QueryService, QueryState, ResultRows};
use crate::error::{ChecksumError, Result};

/// Catalog database holding the archived tables of one source database.
pub fn archive_database_name(archive_id: &str, database: &str) -> String {
    format!("{}-{}-database", archive_id, database)
}

/// Catalog table holding the archived copy of one source table.
pub fn archive_table_name(archive_id: &str, database: &str, table: &str) -> String {
    format!("{}-{}-{}-table", archive_id, database, table)
}

/// Quote a catalog identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Row-count query against the archived copy of `table`.
pub fn archive_count_query(archive_id: &str, database: &str, table: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {}.{}",
        quote_ident(&archive_database_name(archive_id, database)),
        quote_ident(&archive_table_name(archive_id, database, table))
    )
}

/// How the engine waits for an execution to settle.
///
/// With `max_attempts: None` polling is unbounded: a query that never leaves
/// the running state blocks the caller indefinitely. Set a ceiling to turn
/// that into [`ChecksumError::QueryTimeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each state poll.
    pub interval: Duration,
    /// Maximum number of polls, `None` for unbounded.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: None,
        }
    }
}

impl From<&QueryConfig> for PollPolicy {
    fn from(config: &QueryConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// Extract the scalar count from a result set.
fn parse_count(rows: &ResultRows, table: &str) -> Result<i64> {
    let cell = rows
        .get(1)
        .and_then(|row| row.first())
        .ok_or_else(|| ChecksumError::query_unavailable(table, "result set has no data row"))?;

    cell.as_i64().ok_or_else(|| {
        ChecksumError::query_unavailable(table, format!("count cell is not an integer: {:?}", cell))
    })
}

/// Submits count queries to a [`QueryService`] and waits for their results.
#[derive(Clone)]
pub struct ArchiveQueryEngine {
    service: Arc<dyn QueryService>,
    policy: PollPolicy,
}

impl ArchiveQueryEngine {
    pub fn new(service: Arc<dyn QueryService>, policy: PollPolicy) -> Self {
        Self { service, policy }
    }

    /// Count rows of the archived copy of `table`.
    pub async fn count(
        &self,
        archive_id: &str,
        database: &str,
        table: &str,
        output_location: &str,
    ) -> Result<i64> {
        let query = archive_count_query(archive_id, database, table);
        debug!("Submitting archive query: {}", query);

        let execution_id = self
            .service
            .submit(&query, output_location)
            .await
            .map_err(|e| ChecksumError::query_unavailable(table, e))?;

        let state = match self.wait_for_terminal(&execution_id, table).await {
            Ok(state) => state,
            Err(e) => {
                self.discard(&execution_id).await;
                return Err(e);
            }
        };
        if state != QueryState::Succeeded {
            self.discard(&execution_id).await;
            return Err(ChecksumError::query_unavailable(
                table,
                format!("query {} finished in state {}", execution_id, state),
            ));
        }

        let rows = match self.service.fetch_results(&execution_id).await {
            Ok(rows) => rows,
            Err(e) => {
                self.discard(&execution_id).await;
                return Err(ChecksumError::query_unavailable(table, e));
            }
        };

        let count = parse_count(&rows, table)?;
        info!(
            "Archive query {} counted {} rows for table {}",
            execution_id, count, table
        );
        Ok(count)
    }

    async fn discard(&self, execution_id: &str) {
        if let Err(e) = self.service.discard(execution_id).await {
            debug!("Could not discard archive query {}: {}", execution_id, e);
        }
    }

    /// Sleep-then-poll until the execution leaves the queued/running states.
    async fn wait_for_terminal(&self, execution_id: &str, table: &str) -> Result<QueryState> {
        let mut attempts: u32 = 0;
        loop {
            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    return Err(ChecksumError::QueryTimeout {
                        execution_id: execution_id.to_string(),
                        attempts,
                    });
                }
            }

            tokio::time::sleep(self.policy.interval).await;
            attempts += 1;

            let state = self
                .service
                .poll_state(execution_id)
                .await
                .map_err(|e| ChecksumError::query_unavailable(table, e))?;

            if state.is_terminal() {
                debug!(
                    "Archive query {} reached {} after {} polls",
                    execution_id, state, attempts
                );
                return Ok(state);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted query service shared by engine and orchestrator tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::core::{CellValue, QueryService, QueryState, ResultRows};
    use crate::error::{ChecksumError, Result};

    /// Scripted outcome for one submitted query.
    #[derive(Debug, Clone)]
    pub struct Script {
        pub states: Vec<QueryState>,
        pub rows: ResultRows,
    }

    impl Script {
        /// Query that runs once, then succeeds with `count`.
        pub fn count(count: i64) -> Self {
            Self {
                states: vec![QueryState::Running, QueryState::Succeeded],
                rows: vec![vec![CellValue::from("_col0")], vec![CellValue::Text(count.to_string())]],
            }
        }

        pub fn ending(state: QueryState) -> Self {
            Self {
                states: vec![QueryState::Running, state],
                rows: Vec::new(),
            }
        }
    }

    /// Query service answering by catalog table name.
    #[derive(Default)]
    pub struct ScriptedQueryService {
        scripts: Mutex<HashMap<String, Script>>,
        executions: Mutex<HashMap<String, (VecDeque<QueryState>, ResultRows)>>,
        pub submitted: Mutex<Vec<(String, String)>>,
        pub discarded: Mutex<Vec<String>>,
        pub polls: AtomicUsize,
        next_id: AtomicUsize,
        fail_polls: AtomicBool,
        fail_fetches: AtomicBool,
    }

    impl ScriptedQueryService {
        /// Register a script for queries mentioning `catalog_table`.
        pub fn script(self, catalog_table: &str, script: Script) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(catalog_table.to_string(), script);
            self
        }

        /// Every poll fails with a service error.
        pub fn failing_polls(self) -> Self {
            self.fail_polls.store(true, Ordering::SeqCst);
            self
        }

        /// Every fetch fails with a service error.
        pub fn failing_fetches(self) -> Self {
            self.fail_fetches.store(true, Ordering::SeqCst);
            self
        }

        pub fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }

        /// Executions neither fetched nor discarded.
        pub fn open_executions(&self) -> usize {
            self.executions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl QueryService for ScriptedQueryService {
        async fn submit(&self, query: &str, output_location: &str) -> Result<String> {
            self.submitted
                .lock()
                .unwrap()
                .push((query.to_string(), output_location.to_string()));

            let script = self
                .scripts
                .lock()
                .unwrap()
                .iter()
                .find(|(name, _)| query.contains(&format!("\"{}\"", name)))
                .map(|(_, s)| s.clone())
                .ok_or_else(|| ChecksumError::upstream("query", "no such catalog table"))?;

            let id = format!("exec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.executions
                .lock()
                .unwrap()
                .insert(id.clone(), (script.states.into(), script.rows));
            Ok(id)
        }

        async fn poll_state(&self, execution_id: &str) -> Result<QueryState> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail_polls.load(Ordering::SeqCst) {
                return Err(ChecksumError::upstream("query", "throttled"));
            }
            let mut executions = self.executions.lock().unwrap();
            let (states, _) = executions
                .get_mut(execution_id)
                .ok_or_else(|| ChecksumError::upstream("query", "unknown execution"))?;
            let state = if states.len() > 1 {
                states.pop_front()
            } else {
                states.front().copied()
            };
            state.ok_or_else(|| ChecksumError::upstream("query", "no scripted state"))
        }

        async fn fetch_results(&self, execution_id: &str) -> Result<ResultRows> {
            if self.fail_fetches.load(Ordering::SeqCst) {
                return Err(ChecksumError::upstream("query", "result object missing"));
            }
            self.executions
                .lock()
                .unwrap()
                .remove(execution_id)
                .map(|(_, rows)| rows)
                .ok_or_else(|| ChecksumError::upstream("query", "unknown execution"))
        }

        async fn discard(&self, execution_id: &str) -> Result<()> {
            self.executions.lock().unwrap().remove(execution_id);
            self.discarded.lock().unwrap().push(execution_id.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Script, ScriptedQueryService};
    use super::*;
    use crate::core::CellValue;

    fn fast_policy(max_attempts: Option<u32>) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[test]
    fn test_archive_naming_convention() {
        assert_eq!(
            archive_count_query("a1", "sales", "orders"),
            r#"SELECT COUNT(*) FROM "a1-sales-database"."a1-sales-orders-table""#
        );
        assert_eq!(archive_database_name("a1", "sales"), "a1-sales-database");
        assert_eq!(archive_table_name("a1", "sales", "orders"), "a1-sales-orders-table");
    }

    #[test]
    fn test_parse_count() {
        let rows = vec![vec![CellValue::from("_col0")], vec![CellValue::from("42")]];
        assert_eq!(parse_count(&rows, "t").unwrap(), 42);

        let header_only = vec![vec![CellValue::from("_col0")]];
        assert!(matches!(
            parse_count(&header_only, "t"),
            Err(ChecksumError::QueryUnavailable { .. })
        ));

        let not_a_number = vec![vec![CellValue::from("_col0")], vec![CellValue::from("many")]];
        assert!(matches!(
            parse_count(&not_a_number, "t"),
            Err(ChecksumError::QueryUnavailable { .. })
        ));

        let empty_row = vec![vec![CellValue::from("_col0")], vec![]];
        assert!(parse_count(&empty_row, "t").is_err());
    }

    #[tokio::test]
    async fn test_polls_until_terminal_state() {
        let script = Script {
            states: vec![QueryState::Running, QueryState::Running, QueryState::Succeeded],
            rows: vec![vec![CellValue::from("_col0")], vec![CellValue::Integer(1000)]],
        };
        let service = Arc::new(ScriptedQueryService::default().script("a1-db-orders-table", script));
        let engine = ArchiveQueryEngine::new(service.clone(), fast_policy(None));

        let count = engine.count("a1", "db", "orders", "s3://bucket/queries/").await.unwrap();
        assert_eq!(count, 1000);
        assert_eq!(service.polls(), 3);
        assert_eq!(service.open_executions(), 0);

        let submitted = service.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].1, "s3://bucket/queries/");
    }

    #[tokio::test]
    async fn test_queued_is_not_terminal() {
        let script = Script {
            states: vec![QueryState::Queued, QueryState::Running, QueryState::Succeeded],
            rows: vec![vec![CellValue::from("_col0")], vec![CellValue::Integer(5)]],
        };
        let service = Arc::new(ScriptedQueryService::default().script("a1-db-t-table", script));
        let engine = ArchiveQueryEngine::new(service.clone(), fast_policy(None));

        assert_eq!(engine.count("a1", "db", "t", "out").await.unwrap(), 5);
        assert_eq!(service.polls(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_and_failed_are_unavailable() {
        for state in [QueryState::Cancelled, QueryState::Failed] {
            let service = Arc::new(
                ScriptedQueryService::default().script("a1-db-t-table", Script::ending(state)),
            );
            let engine = ArchiveQueryEngine::new(service.clone(), fast_policy(None));

            let err = engine.count("a1", "db", "t", "out").await.unwrap_err();
            assert!(
                matches!(err, ChecksumError::QueryUnavailable { ref table, .. } if table == "t"),
                "unexpected error for {state}: {err}"
            );
            assert_eq!(*service.discarded.lock().unwrap(), vec!["exec-0"]);
            assert_eq!(service.open_executions(), 0);
        }
    }

    #[tokio::test]
    async fn test_poll_ceiling_surfaces_timeout() {
        let script = Script {
            states: vec![QueryState::Running],
            rows: Vec::new(),
        };
        let service = Arc::new(ScriptedQueryService::default().script("a1-db-t-table", script));
        let engine = ArchiveQueryEngine::new(service.clone(), fast_policy(Some(2)));

        let err = engine.count("a1", "db", "t", "out").await.unwrap_err();
        assert!(matches!(err, ChecksumError::QueryTimeout { attempts: 2, .. }));
        assert_eq!(service.polls(), 2);
        assert_eq!(service.open_executions(), 0);
    }

    #[tokio::test]
    async fn test_poll_failure_is_unavailable() {
        let service = Arc::new(
            ScriptedQueryService::default()
                .script("a1-db-t-table", Script::count(3))
                .failing_polls(),
        );
        let engine = ArchiveQueryEngine::new(service.clone(), fast_policy(None));

        let err = engine.count("a1", "db", "t", "out").await.unwrap_err();
        assert!(
            matches!(err, ChecksumError::QueryUnavailable { ref message, .. } if message.contains("throttled"))
        );
        assert_eq!(service.polls(), 1);
        assert_eq!(service.open_executions(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_unavailable() {
        let service = Arc::new(
            ScriptedQueryService::default()
                .script("a1-db-t-table", Script::count(3))
                .failing_fetches(),
        );
        let engine = ArchiveQueryEngine::new(service.clone(), fast_policy(None));

        let err = engine.count("a1", "db", "t", "out").await.unwrap_err();
        assert!(
            matches!(err, ChecksumError::QueryUnavailable { ref message, .. } if message.contains("result object missing"))
        );
        assert_eq!(service.polls(), 2);
        assert_eq!(service.open_executions(), 0);
    }

    #[tokio::test]
    async fn test_submit_failure_is_unavailable() {
        let service = Arc::new(ScriptedQueryService::default());
        let engine = ArchiveQueryEngine::new(service, fast_policy(None));

        let err = engine.count("a1", "db", "missing", "out").await.unwrap_err();
        assert!(matches!(err, ChecksumError::QueryUnavailable { .. }));
    }

    #[test]
    fn test_policy_from_config() {
        let config = QueryConfig {
            poll_interval_ms: 500,
            max_poll_attempts: Some(10),
            ..QueryConfig::default()
        };
        let policy = PollPolicy::from(&config);
        assert_eq!(policy.interval, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, Some(10));

        assert_eq!(PollPolicy::default().interval, Duration::from_secs(2));
        assert_eq!(PollPolicy::default().max_attempts, None);
    }
}
