//! Completion event publishers.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::core::{CompletionEvent, NotificationPublisher};
use crate::error::{ChecksumError, Result};

const SERVICE: &str = "queue";

/// Appends events as JSON lines to `<queue_dir>/<queue>.jsonl`.
pub struct FileQueuePublisher {
    queue_dir: PathBuf,
    append_lock: Mutex<()>,
}

impl FileQueuePublisher {
    pub fn new(queue_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue_dir: queue_dir.into(),
            append_lock: Mutex::new(()),
        }
    }

    /// Path of the file backing `queue`.
    pub fn queue_path(&self, queue: &str) -> PathBuf {
        self.queue_dir.join(format!("{}.jsonl", queue))
    }
}

#[async_trait]
impl NotificationPublisher for FileQueuePublisher {
    async fn publish(&self, queue: &str, event: &CompletionEvent) -> Result<()> {
        if queue.is_empty() || queue.contains(['/', '\\']) {
            return Err(ChecksumError::upstream(
                SERVICE,
                format!("invalid queue name '{}'", queue),
            ));
        }

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.append_lock.lock().await;
        tokio::fs::create_dir_all(&self.queue_dir)
            .await
            .map_err(|e| ChecksumError::upstream(SERVICE, e))?;

        let path = self.queue_path(queue);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ChecksumError::upstream(SERVICE, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ChecksumError::upstream(SERVICE, e))?;
        file.flush()
            .await
            .map_err(|e| ChecksumError::upstream(SERVICE, e))?;

        debug!("Published completion event for {} to {:?}", event.archive_id, path);
        Ok(())
    }
}

/// Forwards `(queue, event)` pairs to an in-process channel.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<(String, CompletionEvent)>,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::UnboundedSender<(String, CompletionEvent)>) -> Self {
        Self { tx }
    }

    /// Create a publisher together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(String, CompletionEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationPublisher for ChannelPublisher {
    async fn publish(&self, queue: &str, event: &CompletionEvent) -> Result<()> {
        self.tx
            .send((queue.to_string(), event.clone()))
            .map_err(|_| ChecksumError::upstream(SERVICE, "receiver dropped"))
    }
}
