//! Query service over archived Parquet files on a local or mounted filesystem.
//!
//! The catalog object `"<db>"."<table>"` resolves to the directory
//! `<data_root>/<db>/<table>/`, and every `*.parquet` file below it belongs
//! to the table. Row counts come from Parquet footers, so no column data is
//! read.
//!
//! Executions follow the same lifecycle as a remote analytical service:
//! `submit` returns immediately with an id in the `QUEUED` state, a Tokio
//! task moves it through `RUNNING` to `SUCCEEDED` or `FAILED`, and callers
//! poll for the outcome. An execution is dropped once its results are
//! fetched or it is discarded.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parquet::file::reader::{FileReader, SerializedFileReader};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{CellValue, QueryExecution, QueryService, QueryState, ResultRows};
use crate::error::{ChecksumError, Result};

/// Header of the single result column, as analytical engines name unaliased aggregates.
const RESULT_COLUMN: &str = "_col0";

type Executions = Arc<RwLock<HashMap<String, QueryExecution>>>;

/// Query service counting rows of archived Parquet tables.
#[derive(Clone)]
pub struct ParquetQueryService {
    data_root: PathBuf,
    executions: Executions,
}

impl ParquetQueryService {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            executions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Snapshot of an execution, including its failure reason if any.
    pub async fn execution(&self, execution_id: &str) -> Option<QueryExecution> {
        self.executions.read().await.get(execution_id).cloned()
    }

    fn table_dir(&self, database: &str, table: &str) -> Result<PathBuf> {
        for name in [database, table] {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(ChecksumError::upstream(
                    "query",
                    format!("invalid catalog identifier: '{}'", name),
                ));
            }
        }
        Ok(self.data_root.join(database).join(table))
    }

    async fn run_execution(
        executions: Executions,
        execution_id: String,
        table_dir: PathBuf,
        output_location: String,
    ) {
        set_state(&executions, &execution_id, QueryState::Running, None, None).await;

        let dir = table_dir.clone();
        let outcome = tokio::task::spawn_blocking(move || count_parquet_rows(&dir))
            .await
            .map_err(|e| format!("count task failed: {}", e))
            .and_then(|r| r.map_err(|e| e.to_string()));

        let count = match outcome {
            Ok(count) => count,
            Err(reason) => {
                warn!("Query {} failed: {}", execution_id, reason);
                set_state(&executions, &execution_id, QueryState::Failed, Some(reason), None).await;
                return;
            }
        };

        let rows: ResultRows = vec![
            vec![CellValue::from(RESULT_COLUMN)],
            vec![CellValue::Text(count.to_string())],
        ];

        if let Err(e) = write_results(&output_location, &execution_id, &rows).await {
            let reason = format!("failed to stage results in {}: {}", output_location, e);
            warn!("Query {} failed: {}", execution_id, reason);
            set_state(&executions, &execution_id, QueryState::Failed, Some(reason), None).await;
            return;
        }

        info!(
            "Query {} counted {} rows under {:?}",
            execution_id, count, table_dir
        );
        set_state(&executions, &execution_id, QueryState::Succeeded, None, Some(rows)).await;
    }
}

async fn set_state(
    executions: &Executions,
    execution_id: &str,
    state: QueryState,
    reason: Option<String>,
    rows: Option<ResultRows>,
) {
    if let Some(execution) = executions.write().await.get_mut(execution_id) {
        execution.state = state;
        execution.state_reason = reason;
        if let Some(rows) = rows {
            execution.rows = rows;
        }
    }
}

/// Stage the result set as `<output_location>/<execution_id>.json`.
///
/// Remote locations (`scheme://...`) are left to the service that owns them.
async fn write_results(output_location: &str, execution_id: &str, rows: &ResultRows) -> Result<()> {
    if output_location.contains("://") {
        debug!("Skipping result staging for remote location {}", output_location);
        return Ok(());
    }

    let dir = Path::new(output_location);
    tokio::fs::create_dir_all(dir).await?;
    let content = serde_json::to_vec_pretty(rows)?;
    tokio::fs::write(dir.join(format!("{}.json", execution_id)), content).await?;
    Ok(())
}

/// Sum footer row counts of every Parquet file below `dir`.
fn count_parquet_rows(dir: &Path) -> Result<i64> {
    if !dir.is_dir() {
        return Err(ChecksumError::upstream(
            "query",
            format!("table location {:?} does not exist", dir),
        ));
    }

    let mut files = Vec::new();
    collect_parquet_files(dir, &mut files)?;
    if files.is_empty() {
        return Err(ChecksumError::upstream(
            "query",
            format!("no parquet files under {:?}", dir),
        ));
    }

    let mut total: i64 = 0;
    for path in &files {
        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file).map_err(|e| {
            ChecksumError::upstream("query", format!("unreadable parquet footer in {:?}: {}", path, e))
        })?;
        total += reader.metadata().file_metadata().num_rows();
    }

    debug!("Counted {} rows across {} parquet files in {:?}", total, files.len(), dir);
    Ok(total)
}

fn collect_parquet_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_parquet_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "parquet") {
            files.push(path);
        }
    }
    Ok(())
}

/// Parse a double-quoted identifier, returning it and the remaining input.
fn parse_quoted(input: &str) -> Option<(String, &str)> {
    let rest = input.strip_prefix('"')?;
    let mut name = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if matches!(chars.peek(), Some((_, '"'))) {
                name.push('"');
                chars.next();
            } else {
                return Some((name, &rest[i + 1..]));
            }
        } else {
            name.push(c);
        }
    }
    None
}

/// Extract `(database, table)` from `SELECT COUNT(*) FROM "<db>"."<table>"`.
fn parse_count_query(query: &str) -> Option<(String, String)> {
    const PREFIX: &str = "SELECT COUNT(*) FROM ";

    let query = query.trim().trim_end_matches(';').trim_end();
    let head = query.get(..PREFIX.len())?;
    if !head.eq_ignore_ascii_case(PREFIX) {
        return None;
    }

    let rest = query[PREFIX.len()..].trim_start();
    let (database, rest) = parse_quoted(rest)?;
    let rest = rest.strip_prefix('.')?;
    let (table, rest) = parse_quoted(rest)?;
    if !rest.trim().is_empty() {
        return None;
    }
    Some((database, table))
}

#[async_trait]
impl QueryService for ParquetQueryService {
    async fn submit(&self, query: &str, output_location: &str) -> Result<String> {
        let (database, table) = parse_count_query(query).ok_or_else(|| {
            ChecksumError::upstream("query", format!("unsupported query: {}", query))
        })?;
        let table_dir = self.table_dir(&database, &table)?;

        let execution_id = Uuid::new_v4().to_string();
        self.executions.write().await.insert(
            execution_id.clone(),
            QueryExecution {
                id: execution_id.clone(),
                state: QueryState::Queued,
                state_reason: None,
                rows: Vec::new(),
            },
        );

        debug!("Query {} queued for {}.{}", execution_id, database, table);
        tokio::spawn(Self::run_execution(
            self.executions.clone(),
            execution_id.clone(),
            table_dir,
            output_location.to_string(),
        ));

        Ok(execution_id)
    }

    async fn poll_state(&self, execution_id: &str) -> Result<QueryState> {
        self.executions
            .read()
            .await
            .get(execution_id)
            .map(|e| e.state)
            .ok_or_else(|| {
                ChecksumError::upstream("query", format!("unknown execution {}", execution_id))
            })
    }

    async fn fetch_results(&self, execution_id: &str) -> Result<ResultRows> {
        let mut executions = self.executions.write().await;
        let state = executions
            .get(execution_id)
            .map(|e| e.state)
            .ok_or_else(|| {
                ChecksumError::upstream("query", format!("unknown execution {}", execution_id))
            })?;

        if state != QueryState::Succeeded {
            return Err(ChecksumError::upstream(
                "query",
                format!("execution {} is {}", execution_id, state),
            ));
        }

        let execution = executions.remove(execution_id).ok_or_else(|| {
            ChecksumError::upstream("query", format!("unknown execution {}", execution_id))
        })?;
        Ok(execution.rows)
    }

    async fn discard(&self, execution_id: &str) -> Result<()> {
        if self.executions.write().await.remove(execution_id).is_some() {
            debug!("Discarded query {}", execution_id);
        }
        Ok(())
    }
}
