//! SQLite implementation of the modmail log store.
//!
//! All writes go through tokio-rusqlite's single background thread; the
//! `SqliteLogStore` wraps the only connection. The schema is one append-only
//! `messages` table created on open.

use async_trait::async_trait;
use rusqlite::params;
use tracing::debug;

use modmail_core::{
    audit::{LogEntry, LogStore},
    errors::Error,
    Result,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id        TEXT    NOT NULL,
    content        TEXT    NOT NULL,
    sender         TEXT    NOT NULL CHECK (sender IN ('user', 'staff')),
    has_attachment INTEGER NOT NULL,
    timestamp      TEXT    NOT NULL
);
";

pub struct SqliteLogStore {
    conn: tokio_rusqlite::Connection,
}

fn store_err(e: impl std::fmt::Display) -> Error {
    Error::Store(e.to_string())
}

impl SqliteLogStore {
    /// Open (or create) the database. `target` is a path or a `file:` URI.
    pub async fn open(target: &str) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(target)
            .await
            .map_err(store_err)?;

        conn.call(|conn| -> std::result::Result<(), rusqlite::Error> {
            // journal_mode returns a row, so it cannot go through execute_batch.
            conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
            conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(store_err)?;

        debug!(path = target, "SQLite log store opened");
        Ok(Self { conn })
    }

    /// Number of stored entries.
    pub async fn count(&self) -> Result<i64> {
        self.conn
            .call(|conn| -> std::result::Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            })
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn insert(&self, entry: &LogEntry) -> Result<()> {
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> std::result::Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO messages (user_id, content, sender, has_attachment, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        entry.user_id,
                        entry.content,
                        entry.sender.as_str(),
                        entry.has_attachment,
                        entry.timestamp.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(store_err)
    }

    async fn close(&self) -> Result<()> {
        self.conn
            .call(|conn| -> std::result::Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(store_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modmail_core::{audit::Sender, domain::UserId};
    use tempfile::tempdir;

    async fn open_temp() -> (SqliteLogStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modmail.db");
        let store = SqliteLogStore::open(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn inserts_rows_with_sender_and_flag() {
        let (store, _dir) = open_temp().await;
        store
            .insert(&LogEntry::new(UserId(11), "Hello", Sender::User, false))
            .await
            .unwrap();
        store
            .insert(&LogEntry::new(UserId(11), "Hi!", Sender::Staff, true))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let rows = store
            .conn
            .call(|conn| -> std::result::Result<Vec<(String, String, bool)>, rusqlite::Error> {
                let mut stmt = conn
                    .prepare("SELECT user_id, sender, has_attachment FROM messages ORDER BY id")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
                rows.collect()
            })
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![
                ("11".to_string(), "user".to_string(), false),
                ("11".to_string(), "staff".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn reopening_keeps_existing_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modmail.db");
        let path = path.to_str().unwrap();

        let store = SqliteLogStore::open(path).await.unwrap();
        store
            .insert(&LogEntry::new(UserId(1), "a", Sender::User, false))
            .await
            .unwrap();
        store.close().await.unwrap();
        drop(store);

        let store = SqliteLogStore::open(path).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stores_rfc3339_timestamps() {
        let (store, _dir) = open_temp().await;
        let entry = LogEntry::new(UserId(1), "a", Sender::User, false);
        store.insert(&entry).await.unwrap();

        let ts = store
            .conn
            .call(|conn| -> std::result::Result<String, rusqlite::Error> {
                conn.query_row("SELECT timestamp FROM messages", [], |row| row.get(0))
            })
            .await
            .unwrap();
        let parsed = chrono::DateTime::parse_from_rfc3339(&ts).unwrap();
        assert_eq!(parsed, entry.timestamp);
    }
}
