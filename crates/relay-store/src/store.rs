use std::path::Path;
use std::sync::Mutex;

use relay_core::types::{MessageRecord, RelayState};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use crate::db::init_db;
use crate::error::{Result, StoreError};

const SELECT_COLUMNS: &str =
    "SELECT id, channel, message_ts, message, relay_state, created_at, relayed_at FROM messages";

/// SQLite-backed message log.
///
/// Wraps a single connection in a `Mutex`; the pipeline drives it from one
/// logical thread of control.
pub struct MessageStore {
    db: Mutex<Connection>,
}

impl MessageStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(path = %path.display(), "opening SQLite database");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Append a message in the `pending` state and return its row ID.
    ///
    /// Callers must not insert a timestamp that is already stored for the
    /// channel.
    #[instrument(skip(self, body))]
    pub fn insert(&self, channel: &str, timestamp: f64, body: &str) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO messages (channel, message_ts, message, relay_state, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)",
            rusqlite::params![channel, timestamp, body, now],
        )?;
        let id = db.last_insert_rowid();
        debug!(id, "message stored");
        Ok(id)
    }

    /// Most recent stored timestamp for `channel`, if any row exists.
    pub fn latest_timestamp(&self, channel: &str) -> Result<Option<f64>> {
        let db = self.db.lock().unwrap();
        let ts = db
            .query_row(
                "SELECT message_ts FROM messages
                 WHERE channel = ?1
                 ORDER BY message_ts DESC
                 LIMIT 1",
                [channel],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(ts)
    }

    /// All pending rows for `channel`, oldest first.
    pub fn fetch_pending(&self, channel: &str) -> Result<Vec<MessageRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE channel = ?1 AND relay_state = 'pending'
             ORDER BY message_ts ASC"
        ))?;
        let rows = stmt
            .query_map([channel], RawRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_record).collect()
    }

    pub fn get(&self, id: i64) -> Result<Option<MessageRecord>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                [id],
                RawRow::from_row,
            )
            .optional()?;
        row.map(RawRow::into_record).transpose()
    }

    /// Move a row from `pending` to `relayed`. The transition happens once;
    /// there is no way back.
    #[instrument(skip(self))]
    pub fn mark_relayed(&self, id: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let n = db.execute(
            "UPDATE messages SET relay_state = 'relayed', relayed_at = ?1
             WHERE id = ?2 AND relay_state = 'pending'",
            rusqlite::params![now, id],
        )?;
        if n == 1 {
            debug!("message marked relayed");
            return Ok(());
        }

        let exists: Option<i64> = db
            .query_row("SELECT id FROM messages WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        match exists {
            Some(_) => Err(StoreError::AlreadyRelayed { id }),
            None => Err(StoreError::NotFound { id }),
        }
    }
}

/// Row as read from SQLite, before the relay state is decoded.
struct RawRow {
    id: i64,
    channel: String,
    timestamp: f64,
    body: String,
    relay_state: String,
    created_at: String,
    relayed_at: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            channel: row.get(1)?,
            timestamp: row.get(2)?,
            body: row.get(3)?,
            relay_state: row.get(4)?,
            created_at: row.get(5)?,
            relayed_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<MessageRecord> {
        let relay_state: RelayState = self
            .relay_state
            .parse()
            .map_err(|reason| StoreError::Corrupt {
                id: self.id,
                reason,
            })?;
        Ok(MessageRecord {
            id: self.id,
            channel: self.channel,
            timestamp: self.timestamp,
            body: self.body,
            relay_state,
            created_at: self.created_at,
            relayed_at: self.relayed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MessageStore {
        MessageStore::open_in_memory().unwrap()
    }

    #[test]
    fn insert_starts_pending() {
        let store = store();
        let id = store.insert("C1", 1000.0, r#"{"ts":"1000"}"#).unwrap();

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.channel, "C1");
        assert_eq!(record.timestamp, 1000.0);
        assert_eq!(record.body, r#"{"ts":"1000"}"#);
        assert_eq!(record.relay_state, RelayState::Pending);
        assert!(record.relayed_at.is_none());
    }

    #[test]
    fn latest_timestamp_is_per_channel() {
        let store = store();
        assert_eq!(store.latest_timestamp("C1").unwrap(), None);

        store.insert("C1", 1000.5, "{}").unwrap();
        store.insert("C1", 2000.25, "{}").unwrap();
        store.insert("C2", 9000.0, "{}").unwrap();

        assert_eq!(store.latest_timestamp("C1").unwrap(), Some(2000.25));
        assert_eq!(store.latest_timestamp("C2").unwrap(), Some(9000.0));
    }

    #[test]
    fn pending_is_ordered_by_timestamp() {
        let store = store();
        store.insert("C1", 3000.0, "{}").unwrap();
        store.insert("C1", 1000.0, "{}").unwrap();
        store.insert("C1", 2000.0, "{}").unwrap();
        store.insert("C2", 500.0, "{}").unwrap();

        let ts: Vec<f64> = store
            .fetch_pending("C1")
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(ts, vec![1000.0, 2000.0, 3000.0]);
    }

    #[test]
    fn relayed_rows_leave_the_backlog() {
        let store = store();
        let first = store.insert("C1", 1000.0, "{}").unwrap();
        let second = store.insert("C1", 2000.0, "{}").unwrap();

        store.mark_relayed(first).unwrap();

        let pending = store.fetch_pending("C1").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second);

        let record = store.get(first).unwrap().unwrap();
        assert_eq!(record.relay_state, RelayState::Relayed);
        assert!(record.relayed_at.is_some());
    }

    #[test]
    fn mark_relayed_is_one_way() {
        let store = store();
        let id = store.insert("C1", 1000.0, "{}").unwrap();

        store.mark_relayed(id).unwrap();
        assert!(matches!(
            store.mark_relayed(id),
            Err(StoreError::AlreadyRelayed { id: got }) if got == id
        ));
        assert!(matches!(
            store.mark_relayed(id + 100),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.db");

        let store = MessageStore::open(&path).unwrap();
        store.insert("C1", 1000.0, "{}").unwrap();
        drop(store);

        let reopened = MessageStore::open(&path).unwrap();
        assert_eq!(reopened.latest_timestamp("C1").unwrap(), Some(1000.0));
    }
}
