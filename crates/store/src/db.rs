use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use logbook_core::error::{LogbookError, Result};
use logbook_core::model::LogEntry;
use logbook_core::query::StatusResponse;
use tokio::sync::broadcast;

use crate::schema::SCHEMA_SQL;

const FEED_CAPACITY: usize = 8192;

/// Shared handle to the log table. Clones share one connection and one
/// live feed.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
    feed_tx: broadcast::Sender<LogEntry>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LogbookError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| LogbookError::Store(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch("PRAGMA threads=4;")
            .map_err(|e| LogbookError::Store(format!("failed to set pragmas: {e}")))?;
        Self::init(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LogbookError::Store(format!("failed to open in-memory db: {e}")))?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, db_path: String) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| LogbookError::Store(format!("failed to initialize schema: {e}")))?;
        let (feed_tx, _) = broadcast::channel(FEED_CAPACITY);
        tracing::debug!(db_path = %db_path, "log store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
            feed_tx,
        })
    }

    pub(crate) fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LogbookError::Internal("store mutex poisoned".to_string()))
    }

    pub fn status(&self) -> Result<StatusResponse> {
        let conn = self.conn()?;

        let entries_count = conn
            .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get::<_, i64>(0))
            .map(|v| v as u64)
            .map_err(|e| LogbookError::Store(format!("query failed: {e}")))?;
        let oldest_at = scalar_ts(&conn, "SELECT MIN(created_at) FROM logs")?;
        let newest_at = scalar_ts(&conn, "SELECT MAX(created_at) FROM logs")?;

        let db_size_bytes = if self.db_path == ":memory:" {
            0
        } else {
            fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StatusResponse {
            db_path: self.db_path.clone(),
            db_size_bytes,
            entries_count,
            oldest_at,
            newest_at,
        })
    }

    /// Entries committed after this call, in commit order.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.feed_tx.subscribe()
    }

    pub(crate) fn publish(&self, entry: LogEntry) {
        let _ = self.feed_tx.send(entry);
    }
}

fn scalar_ts(conn: &Connection, sql: &str) -> Result<Option<DateTime<Utc>>> {
    conn.query_row(sql, [], |row| row.get::<_, Option<NaiveDateTime>>(0))
        .map(|opt| opt.map(|dt| dt.and_utc()))
        .map_err(|e| LogbookError::Store(format!("query failed: {e}")))
}
