use duckdb::params;
use logbook_core::error::{LogbookError, Result};
use logbook_core::model::{LogEntry, NewLogEntry};

use crate::Store;
use crate::sql::ts_text;

impl Store {
    /// Appends a batch atomically: either every entry is stored with a fresh
    /// id or none is. Stored entries are published to the live feed after
    /// commit, in input order.
    pub fn insert_logs(&self, entries: &[NewLogEntry]) -> Result<Vec<LogEntry>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        for entry in entries {
            entry.validate()?;
        }

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| LogbookError::Store(format!("begin tx failed: {e}")))?;

        let mut stored = Vec::with_capacity(entries.len());
        {
            let mut next_id = tx
                .prepare("SELECT nextval('logs_id_seq')")
                .map_err(|e| LogbookError::Store(format!("prepare id sequence failed: {e}")))?;
            let mut insert = tx
                .prepare(
                    "INSERT INTO logs (id, message, stack_trace, level, program_name, program_version, windows_version, system_details, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?::TIMESTAMP)",
                )
                .map_err(|e| LogbookError::Store(format!("prepare insert logs failed: {e}")))?;

            for entry in entries {
                let id = next_id
                    .query_row([], |row| row.get::<_, i64>(0))
                    .map_err(|e| LogbookError::Store(format!("allocate log id failed: {e}")))?;
                insert
                    .execute(params![
                        id,
                        entry.message,
                        entry.stack_trace,
                        entry.level,
                        entry.program_name,
                        entry.program_version,
                        entry.windows_version,
                        entry.system_details,
                        ts_text(entry.created_at),
                    ])
                    .map_err(|e| LogbookError::Store(format!("insert log failed: {e}")))?;
                stored.push(entry.clone().into_entry(id));
            }
        }

        tx.commit()
            .map_err(|e| LogbookError::Store(format!("commit logs failed: {e}")))?;
        drop(conn);

        tracing::debug!(count = stored.len(), "stored log batch");
        for entry in &stored {
            self.publish(entry.clone());
        }
        Ok(stored)
    }
}
