use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Row;
use duckdb::types::Value;
use logbook_core::filter::LogPredicate;
use logbook_core::model::LogEntry;

pub(crate) const ENTRY_COLUMNS: &str = "id, message, stack_trace, level, program_name, program_version, windows_version, system_details, created_at";

/// Parameterized `WHERE` fragments for a predicate, joined with `AND`.
#[derive(Debug, Default)]
pub(crate) struct WhereClause {
    parts: Vec<&'static str>,
    pub(crate) args: Vec<Value>,
}

impl WhereClause {
    pub(crate) fn from_predicate(p: &LogPredicate) -> Self {
        let mut clause = Self::default();

        if let Some(from) = p.window.from {
            clause.push("created_at >= ?::TIMESTAMP", [ts_value(from)]);
        }
        if let Some(to) = p.window.to {
            clause.push("created_at <= ?::TIMESTAMP", [ts_value(to)]);
        }
        if let Some(level) = p.level {
            clause.push("level = ?", [Value::Int(level)]);
        }
        if let Some(v) = &p.program_name {
            clause.push("contains(program_name, ?::VARCHAR)", [text(v)]);
        }
        if let Some(v) = &p.program_version {
            clause.push("contains(program_version, ?::VARCHAR)", [text(v)]);
        }
        if let Some(v) = &p.windows_version {
            clause.push("contains(windows_version, ?::VARCHAR)", [text(v)]);
        }
        if let Some(v) = &p.system_details {
            clause.push("system_details = ?", [text(v)]);
        }
        match p.has_stack_trace {
            Some(true) => clause.push("(stack_trace IS NOT NULL AND stack_trace <> '')", []),
            Some(false) => clause.push("(stack_trace IS NULL OR stack_trace = '')", []),
            None => {}
        }
        if let Some(needle) = &p.search {
            clause.push(
                "(contains(message, ?::VARCHAR) OR (stack_trace IS NOT NULL AND contains(stack_trace, ?::VARCHAR)))",
                [text(needle), text(needle)],
            );
        }

        clause
    }

    pub(crate) fn push<const N: usize>(&mut self, part: &'static str, args: [Value; N]) {
        self.parts.push(part);
        self.args.extend(args);
    }

    pub(crate) fn sql(&self) -> String {
        if self.parts.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.parts.join(" AND "))
        }
    }
}

fn text(v: &str) -> Value {
    Value::Text(v.to_string())
}

/// Timestamps are bound as naive UTC text and cast server-side.
pub(crate) fn ts_value(ts: DateTime<Utc>) -> Value {
    Value::Text(ts_text(ts))
}

pub(crate) fn ts_text(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

pub(crate) fn naive_to_utc(ts: NaiveDateTime) -> DateTime<Utc> {
    ts.and_utc()
}

/// Maps a row selected with [`ENTRY_COLUMNS`].
pub(crate) fn entry_from_row(row: &Row<'_>) -> duckdb::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get::<_, i64>(0)?,
        message: row.get::<_, String>(1)?,
        stack_trace: row.get::<_, Option<String>>(2)?,
        level: row.get::<_, i32>(3)?,
        program_name: row.get::<_, String>(4)?,
        program_version: row.get::<_, String>(5)?,
        windows_version: row.get::<_, String>(6)?,
        system_details: row.get::<_, String>(7)?,
        created_at: naive_to_utc(row.get::<_, NaiveDateTime>(8)?),
    })
}
