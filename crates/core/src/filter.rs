use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::LogEntry;
use crate::params::{blank_as_none, blank_str_as_none, blank_time_as_none};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Window length used when a browsing request leaves a bound unset.
pub fn default_window() -> Duration {
    Duration::hours(24)
}

/// Inclusive `[from, to]` range; either side may be open.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self { from: None, to: None }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// `[now - span, now]`.
    pub fn trailing(span: Duration, now: DateTime<Utc>) -> Self {
        Self::between(now - span, now)
    }

    /// Swaps the bounds when both are set and reversed.
    pub fn ordered(self) -> Self {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Self::between(to, from),
            _ => self,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(from) = self.from
            && ts < from
        {
            return false;
        }
        if let Some(to) = self.to
            && ts > to
        {
            return false;
        }
        true
    }
}

/// How unset time bounds are resolved during normalization.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum WindowDefaults {
    /// Unset bounds stay open.
    #[default]
    Open,
    /// Unset bounds are filled in to form a 24h window (browsing views).
    LastDay,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    CreatedAt,
    Level,
    ProgramName,
}

impl SortKey {
    /// Case-insensitive; anything unrecognized, including nothing, sorts by
    /// creation time.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("level") => Self::Level,
            Some("programname") => Self::ProgramName,
            _ => Self::CreatedAt,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Level => "level",
            Self::ProgramName => "program_name",
        }
    }

    pub fn compare(self, a: &LogEntry, b: &LogEntry) -> Ordering {
        match self {
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::Level => a.level.cmp(&b.level),
            Self::ProgramName => a.program_name.cmp(&b.program_name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub desc: bool,
}

impl SortSpec {
    /// Only a case-insensitive `desc` sorts descending once a direction is
    /// given; `asc` and anything else sort ascending. No direction at all
    /// means newest first.
    pub fn parse(sort_by: Option<&str>, sort_dir: Option<&str>) -> Self {
        Self {
            key: SortKey::parse(sort_by),
            desc: sort_dir.is_none_or(|d| d.trim().eq_ignore_ascii_case("desc")),
        }
    }

    /// Orders by the key, then by id, both in the requested direction.
    pub fn compare(&self, a: &LogEntry, b: &LogEntry) -> Ordering {
        let ord = self.key.compare(a, b).then_with(|| a.id.cmp(&b.id));
        if self.desc { ord.reverse() } else { ord }
    }

    pub fn direction_sql(&self) -> &'static str {
        if self.desc { "DESC" } else { "ASC" }
    }
}

/// Caller-supplied query description, straight from the boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    #[serde(default, deserialize_with = "blank_time_as_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "blank_time_as_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub level: Option<i32>,
    #[serde(default, deserialize_with = "blank_str_as_none")]
    pub program_name: Option<String>,
    #[serde(default, deserialize_with = "blank_str_as_none")]
    pub program_version: Option<String>,
    #[serde(default, deserialize_with = "blank_str_as_none")]
    pub windows_version: Option<String>,
    #[serde(default, deserialize_with = "blank_str_as_none")]
    pub system_details: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub has_stack_trace: Option<bool>,
    #[serde(default, deserialize_with = "blank_str_as_none")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub page_size: Option<i64>,
    #[serde(default, deserialize_with = "blank_str_as_none")]
    pub sort_by: Option<String>,
    #[serde(default, deserialize_with = "blank_str_as_none")]
    pub sort_dir: Option<String>,
}

impl FilterSpec {
    /// Resolves defaults, clamps and swaps into a new query value. The
    /// filter itself is left untouched.
    pub fn normalize(&self, defaults: WindowDefaults, now: DateTime<Utc>) -> LogQuery {
        let window = TimeWindow {
            from: self.from,
            to: self.to,
        };
        let window = match defaults {
            WindowDefaults::Open => window,
            WindowDefaults::LastDay => fill_window(window, now),
        }
        .ordered();

        LogQuery {
            predicate: LogPredicate {
                window,
                level: self.level,
                program_name: non_blank(&self.program_name),
                program_version: non_blank(&self.program_version),
                windows_version: non_blank(&self.windows_version),
                system_details: non_blank(&self.system_details),
                has_stack_trace: self.has_stack_trace,
                search: non_blank(&self.search),
            },
            sort: SortSpec::parse(self.sort_by.as_deref(), self.sort_dir.as_deref()),
            page: clamp_page(self.page),
            page_size: clamp_page_size(self.page_size),
        }
    }
}

fn fill_window(window: TimeWindow, now: DateTime<Utc>) -> TimeWindow {
    let span = default_window();
    match (window.from, window.to) {
        (None, None) => TimeWindow::trailing(span, now),
        (Some(from), None) => TimeWindow::between(from, from + span),
        (None, Some(to)) => TimeWindow::between(to - span, to),
        (Some(_), Some(_)) => window,
    }
}

fn clamp_page(raw: Option<i64>) -> u32 {
    match raw {
        Some(page) if page >= 1 => u32::try_from(page).unwrap_or(u32::MAX),
        _ => 1,
    }
}

fn clamp_page_size(raw: Option<i64>) -> u32 {
    match raw {
        Some(size) if size < 1 => DEFAULT_PAGE_SIZE,
        Some(size) if size > i64::from(MAX_PAGE_SIZE) => MAX_PAGE_SIZE,
        Some(size) => size as u32,
        None => DEFAULT_PAGE_SIZE,
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

/// Conjunction of entry conditions. Unset fields do not constrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogPredicate {
    pub window: TimeWindow,
    pub level: Option<i32>,
    pub program_name: Option<String>,
    pub program_version: Option<String>,
    pub windows_version: Option<String>,
    pub system_details: Option<String>,
    pub has_stack_trace: Option<bool>,
    pub search: Option<String>,
}

impl LogPredicate {
    pub fn within(window: TimeWindow) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.window.contains(entry.created_at) {
            return false;
        }
        if let Some(level) = self.level
            && entry.level != level
        {
            return false;
        }
        if !contains_opt(&entry.program_name, &self.program_name)
            || !contains_opt(&entry.program_version, &self.program_version)
            || !contains_opt(&entry.windows_version, &self.windows_version)
        {
            return false;
        }
        if let Some(system) = &self.system_details
            && &entry.system_details != system
        {
            return false;
        }
        if let Some(wanted) = self.has_stack_trace
            && entry.has_stack_trace() != wanted
        {
            return false;
        }
        if let Some(needle) = &self.search {
            let in_trace = entry
                .stack_trace
                .as_deref()
                .is_some_and(|t| t.contains(needle.as_str()));
            if !entry.message.contains(needle.as_str()) && !in_trace {
                return false;
            }
        }
        true
    }
}

fn contains_opt(haystack: &str, needle: &Option<String>) -> bool {
    needle
        .as_deref()
        .is_none_or(|needle| haystack.contains(needle))
}

/// A normalized, safe-to-run page query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogQuery {
    pub predicate: LogPredicate,
    pub sort: SortSpec,
    pub page: u32,
    pub page_size: u32,
}

impl LogQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}
