use crate::store::{LayoutStore, NOTIFY_CAPACITY};
use crate::now_ms;
use anyhow::Context;
use cultigrid_protocol::{LayoutDocument, StoredDocument};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const DEFAULT_KEY: &str = "layout";

/// SQLite-backed document store. Every write appends to `event_log`, whose
/// sequence is the document revision.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
    key: String,
    notify: broadcast::Sender<StoredDocument>,
    last_broadcast: Arc<AtomicI64>,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            db_path: db_path.into(),
            key: key.into(),
            notify,
            last_broadcast: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // Another process may be writing the same document.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        migrate(&conn)?;
        Ok(conn)
    }

    /// Latest revision written by anyone, 0 if none.
    pub fn get_rev(&self) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let rev: Option<i64> = conn.query_row(
            "SELECT rev FROM documents WHERE key = ?1",
            [&self.key],
            |row| row.get(0),
        )
        .optional()?;
        Ok(rev.unwrap_or(0))
    }

    /// Re-read the document and broadcast it if nothing at its revision or later
    /// went out yet. Picks up writes made by other processes.
    pub fn refresh(&self) -> anyhow::Result<Option<i64>> {
        // Skip decoding the body when the revision has not moved.
        if self.get_rev()? <= self.last_broadcast.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let Some(stored) = self.get()? else {
            return Ok(None);
        };
        let rev = stored.rev;
        if self.mark_broadcast(rev) {
            let _ = self.notify.send(stored);
            return Ok(Some(rev));
        }
        Ok(None)
    }

    /// Returns true if `rev` is newer than anything broadcast so far.
    fn mark_broadcast(&self, rev: i64) -> bool {
        self.last_broadcast.fetch_max(rev, Ordering::SeqCst) < rev
    }
}

impl LayoutStore for SqliteStore {
    fn get(&self) -> anyhow::Result<Option<StoredDocument>> {
        let conn = self.open()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT rev, body_json FROM documents WHERE key = ?1",
                [&self.key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context(|| format!("read document {}", self.key))?;
        let Some((rev, body)) = row else {
            return Ok(None);
        };
        let document: LayoutDocument = serde_json::from_str(&body)
            .with_context(|| format!("decode document {} at rev {rev}", self.key))?;
        Ok(Some(StoredDocument { rev, document }))
    }

    fn put(&self, document: &LayoutDocument) -> anyhow::Result<i64> {
        let mut conn = self.open()?;
        let body = serde_json::to_string(document)?;
        let tx = conn.transaction()?;
        let rev = append_event_tx(
            &tx,
            "layout.published",
            &self.key,
            serde_json::json!({ "by": document.updated_by, "at": document.updated_at }),
        )?;
        tx.execute(
            "INSERT INTO documents (key, body_json, updated_at, updated_by, rev)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
               body_json = excluded.body_json,
               updated_at = excluded.updated_at,
               updated_by = excluded.updated_by,
               rev = excluded.rev",
            (&self.key, &body, &document.updated_at, &document.updated_by, rev),
        )?;
        tx.commit()
            .with_context(|| format!("write document {}", self.key))?;

        if self.mark_broadcast(rev) {
            let _ = self.notify.send(StoredDocument {
                rev,
                document: document.clone(),
            });
        }
        Ok(rev)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoredDocument> {
        self.notify.subscribe()
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
-- Monotonic revision source for document sync.
CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  kind TEXT NOT NULL,
  doc_key TEXT NOT NULL,
  payload_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_event_log_doc ON event_log(doc_key);

CREATE TABLE IF NOT EXISTS documents (
  key TEXT PRIMARY KEY,
  body_json TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  updated_by TEXT NOT NULL,
  rev INTEGER NOT NULL
);
"#,
        )?;

        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    Ok(())
}

fn append_event_tx(
    tx: &rusqlite::Transaction<'_>,
    kind: &str,
    doc_key: &str,
    payload: serde_json::Value,
) -> anyhow::Result<i64> {
    let payload_json = payload.to_string();
    tx.execute(
        "INSERT INTO event_log (ts_ms, kind, doc_key, payload_json) VALUES (?1, ?2, ?3, ?4)",
        (now_ms(), kind, doc_key, payload_json),
    )?;
    Ok(tx.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::default_grid;

    fn temp_store() -> SqliteStore {
        let p = std::env::temp_dir().join(format!(
            "cultigrid-engine-test-{}.db",
            time::OffsetDateTime::now_utc().unix_timestamp_nanos()
        ));
        SqliteStore::new(p, DEFAULT_KEY)
    }

    fn doc(by: &str) -> LayoutDocument {
        LayoutDocument::new(&default_grid(), by, "2026-01-01T00:00:00Z")
    }

    #[test]
    fn missing_document_reads_as_none() {
        let store = temp_store();
        assert_eq!(store.get().unwrap(), None);
        assert_eq!(store.get_rev().unwrap(), 0);
    }

    #[test]
    fn put_overwrites_and_revisions_increase() {
        let store = temp_store();
        let r1 = store.put(&doc("u1")).unwrap();
        let r2 = store.put(&doc("u2")).unwrap();
        assert!(r2 > r1);

        let got = store.get().unwrap().unwrap();
        assert_eq!(got.rev, r2);
        assert_eq!(got.document, doc("u2"));
        assert_eq!(store.get_rev().unwrap(), r2);
    }

    #[test]
    fn refresh_broadcasts_foreign_writes_once() {
        let store = temp_store();
        // A second handle on the same file stands in for another process.
        let other = SqliteStore::new(store.db_path().to_path_buf(), DEFAULT_KEY);
        let mut rx = store.subscribe();

        let rev = other.put(&doc("u2")).unwrap();
        assert!(rx.try_recv().is_err());

        assert_eq!(store.refresh().unwrap(), Some(rev));
        assert_eq!(rx.try_recv().unwrap().document.updated_by, "u2");
        assert_eq!(store.refresh().unwrap(), None);
    }

    #[test]
    fn own_writes_are_not_rebroadcast_by_refresh() {
        let store = temp_store();
        let mut rx = store.subscribe();
        store.put(&doc("u1")).unwrap();
        assert!(rx.try_recv().is_ok());
        assert_eq!(store.refresh().unwrap(), None);
    }

    #[test]
    fn keys_are_independent() {
        let store = temp_store();
        let other = SqliteStore::new(store.db_path().to_path_buf(), "other");
        store.put(&doc("u1")).unwrap();
        assert_eq!(other.get().unwrap(), None);
    }
}
