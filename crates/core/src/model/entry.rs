use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LogbookError, Result};
use crate::model::severity::Severity;

/// A stored log entry. Never updated after it is written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: i64,
    pub message: String,
    pub stack_trace: Option<String>,
    pub level: i32,
    pub program_name: String,
    pub program_version: String,
    pub windows_version: String,
    pub system_details: String,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    /// An empty stack trace counts as no stack trace.
    pub fn has_stack_trace(&self) -> bool {
        self.stack_trace.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn severity(&self) -> Option<Severity> {
        Severity::from_code(self.level)
    }
}

/// An entry as a producer submits it, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewLogEntry {
    pub message: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default = "default_level")]
    pub level: i32,
    pub program_name: String,
    pub program_version: String,
    pub windows_version: String,
    pub system_details: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_level() -> i32 {
    Severity::default().code()
}

impl NewLogEntry {
    pub fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(LogbookError::InvalidArgument(
                "log message must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_entry(self, id: i64) -> LogEntry {
        LogEntry {
            id,
            message: self.message,
            stack_trace: self.stack_trace,
            level: self.level,
            program_name: self.program_name,
            program_version: self.program_version,
            windows_version: self.windows_version,
            system_details: self.system_details,
            created_at: self.created_at,
        }
    }
}
