use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::{DEFAULT_PAGE_SIZE, LogPredicate, MAX_PAGE_SIZE, TimeWindow};
use crate::model::{LogEntry, SeverityCounts};
use crate::params::{blank_as_none, blank_str_as_none, blank_time_as_none, present_time};

/// Row cap for the system-name picker.
pub const SYSTEM_NAMES_CAP: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub items: Vec<LogEntry>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    /// The window actually queried, after defaulting.
    pub window: TimeWindow,
}

impl LogPage {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.page_size.max(1)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemsRequest {
    #[serde(default, deserialize_with = "blank_time_as_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "blank_time_as_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "blank_str_as_none")]
    pub program_name: Option<String>,
}

impl SystemsRequest {
    pub fn predicate(&self) -> LogPredicate {
        LogPredicate {
            program_name: self.program_name.clone(),
            ..LogPredicate::within(TimeWindow {
                from: self.from,
                to: self.to,
            })
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemSummary {
    pub system_details: String,
    pub count: u64,
    pub last_log_at: DateTime<Utc>,
}

/// The outer `Option` records whether the bound was sent at all; a blank
/// `from=` is `Some(None)` and still selects a period.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatsRequest {
    #[serde(
        default,
        deserialize_with = "present_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub from: Option<Option<DateTime<Utc>>>,
    #[serde(
        default,
        deserialize_with = "present_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub to: Option<Option<DateTime<Utc>>>,
}

/// Which windows a stats request aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPlan {
    Rolling {
        last_day: TimeWindow,
        last_week: TimeWindow,
        last_month: TimeWindow,
    },
    Period(TimeWindow),
}

impl StatsRequest {
    /// A request naming either bound, even blank, gets one period over what
    /// it named with blanks left open; otherwise the rolling day, week and
    /// month ending at `now`.
    pub fn plan(&self, now: DateTime<Utc>) -> StatsPlan {
        if self.from.is_none() && self.to.is_none() {
            return StatsPlan::Rolling {
                last_day: TimeWindow::trailing(Duration::days(1), now),
                last_week: TimeWindow::trailing(Duration::days(7), now),
                last_month: TimeWindow::trailing(Duration::days(30), now),
            };
        }
        StatsPlan::Period(
            TimeWindow {
                from: self.from.flatten(),
                to: self.to.flatten(),
            }
            .ordered(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StatsResponse {
    Rolling {
        #[serde(rename = "lastDay")]
        last_day: SeverityCounts,
        #[serde(rename = "lastWeek")]
        last_week: SeverityCounts,
        #[serde(rename = "lastMonth")]
        last_month: SeverityCounts,
    },
    Period {
        period: SeverityCounts,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OldestRequest {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub count: Option<i64>,
}

impl OldestRequest {
    pub fn limit(&self) -> u32 {
        match self.count {
            Some(count) if count < 1 => 1,
            Some(count) if count > i64::from(MAX_PAGE_SIZE) => MAX_PAGE_SIZE,
            Some(count) => count as u32,
            None => DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub entries_count: u64,
    pub oldest_at: Option<DateTime<Utc>>,
    pub newest_at: Option<DateTime<Utc>>,
}
