use std::sync::Arc;

use tracing::info;

use modmail_core::{
    audit::{JsonlLogStore, LogStore},
    config::StoreTarget,
    Result,
};
use modmail_sqlite::SqliteLogStore;

pub async fn open_store(target: &StoreTarget) -> Result<Arc<dyn LogStore>> {
    match target {
        StoreTarget::Sqlite(path) => {
            let store = SqliteLogStore::open(path).await?;
            info!(path = %path, "logging to SQLite");
            Ok(Arc::new(store))
        }
        StoreTarget::Jsonl(path) => {
            let store = JsonlLogStore::open(path.clone()).await?;
            info!(path = %path.display(), "logging to JSON lines");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use modmail_core::{
        audit::{LogEntry, Sender},
        domain::UserId,
    };

    use super::*;

    #[tokio::test]
    async fn opens_each_backend() {
        let dir = tempfile::tempdir().unwrap();
        let targets = [
            StoreTarget::Sqlite(dir.path().join("log.db").to_string_lossy().to_string()),
            StoreTarget::Jsonl(dir.path().join("log.jsonl")),
        ];
        for target in targets {
            let store = open_store(&target).await.unwrap();
            store
                .insert(&LogEntry::new(UserId(1), "hello", Sender::User, false))
                .await
                .unwrap();
            store.close().await.unwrap();
        }
        assert!(dir.path().join("log.db").exists());
        let lines = std::fs::read_to_string(dir.path().join("log.jsonl")).unwrap();
        assert_eq!(lines.lines().count(), 1);
    }

    #[tokio::test]
    async fn unwritable_target_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // A regular file where a directory is expected.
        let target = StoreTarget::Jsonl(blocker.join("log.jsonl"));
        assert!(open_store(&target).await.is_err());
    }
}
