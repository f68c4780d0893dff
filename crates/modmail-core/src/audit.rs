//! Audit log of forwarded messages.
//!
//! The router never waits on the store: entries go through a bounded queue to
//! a single writer task. When the queue is full the newest entry is dropped
//! and a warning is logged. Store failures are logged and never retried.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    io::AsyncWriteExt,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, warn};

use crate::{domain::UserId, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Staff,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Staff => "staff",
        }
    }
}

/// One forwarded message. Written once, never updated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub user_id: String,
    pub content: String,
    pub sender: Sender,
    pub has_attachment: bool,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(user: UserId, content: &str, sender: Sender, has_attachment: bool) -> Self {
        Self {
            user_id: user.to_string(),
            content: content.to_string(),
            sender,
            has_attachment,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only persistence port.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn insert(&self, entry: &LogEntry) -> Result<()>;

    /// Flush/checkpoint before exit. Called once by the writer after the queue drains.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ============== Queue ==============

/// Cheap-to-clone handle the router records entries through.
#[derive(Clone, Debug)]
pub struct AuditLog {
    tx: mpsc::Sender<LogEntry>,
}

/// Owns the writer task; `finish()` flushes what is queued and stops it.
pub struct AuditWriter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<usize>,
}

impl AuditLog {
    pub fn spawn(store: Arc<dyn LogStore>, capacity: usize) -> (Self, AuditWriter) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_writer(store, rx, stop_rx));
        (
            Self { tx },
            AuditWriter {
                stop: stop_tx,
                handle,
            },
        )
    }

    /// Enqueue without waiting. Returns false when the entry was dropped.
    pub fn record(&self, entry: LogEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                warn!(
                    user_id = %entry.user_id,
                    sender = entry.sender.as_str(),
                    "audit queue full, dropping log entry"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                warn!(
                    user_id = %entry.user_id,
                    sender = entry.sender.as_str(),
                    "audit writer stopped, dropping log entry"
                );
                false
            }
        }
    }
}

impl AuditWriter {
    /// Stop accepting entries, write everything already queued, and return
    /// how many entries the store accepted over the writer's lifetime.
    pub async fn finish(self) -> usize {
        let _ = self.stop.send(());
        match self.handle.await {
            Ok(written) => written,
            Err(e) => {
                error!("audit writer task failed: {e}");
                0
            }
        }
    }
}

async fn run_writer(
    store: Arc<dyn LogStore>,
    mut rx: mpsc::Receiver<LogEntry>,
    mut stop: oneshot::Receiver<()>,
) -> usize {
    let mut written = 0usize;
    let mut stopping = false;

    loop {
        let next = if stopping {
            rx.recv().await
        } else {
            tokio::select! {
                entry = rx.recv() => entry,
                _ = &mut stop => {
                    stopping = true;
                    rx.close();
                    continue;
                }
            }
        };

        let Some(entry) = next else {
            break;
        };

        match store.insert(&entry).await {
            Ok(()) => written += 1,
            Err(e) => error!(
                user_id = %entry.user_id,
                sender = entry.sender.as_str(),
                "failed to persist log entry: {e}"
            ),
        }
    }

    if let Err(e) = store.close().await {
        warn!("failed to close log store: {e}");
    }
    debug!(written, "audit writer stopped");
    written
}

// ============== JSON lines store ==============

/// Appends one JSON object per line.
#[derive(Clone, Debug)]
pub struct JsonlLogStore {
    path: PathBuf,
}

impl JsonlLogStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Fail at startup rather than on the first insert.
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl LogStore for JsonlLogStore {
    async fn insert(&self, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
