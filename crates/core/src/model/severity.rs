use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LogbookError, Result};

/// Severity codes as producers send them, ascending.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Severity {
    Trace = 0,
    Debug = 1,
    #[default]
    Information = 2,
    Warning = 3,
    Error = 4,
    Critical = 5,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Self::Trace,
        Self::Debug,
        Self::Information,
        Self::Warning,
        Self::Error,
        Self::Critical,
    ];

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Trace),
            1 => Some(Self::Debug),
            2 => Some(Self::Information),
            3 => Some(Self::Warning),
            4 => Some(Self::Error),
            5 => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Trace => "Trace",
            Self::Debug => "Debug",
            Self::Information => "Information",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = LogbookError;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(code) = s.trim().parse::<i32>() {
            return Self::from_code(code)
                .ok_or_else(|| LogbookError::Parse(format!("unknown severity code: {code}")));
        }
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" | "INFORMATION" => Ok(Self::Information),
            "WARN" | "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" | "FATAL" => Ok(Self::Critical),
            _ => Err(LogbookError::Parse(format!("unknown severity: {s}"))),
        }
    }
}

/// Per-severity bucket counts. Every bucket is always present; unknown
/// codes never land in any bucket and never reach `total`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SeverityCounts {
    pub trace: u64,
    pub debug: u64,
    pub information: u64,
    pub warning: u64,
    pub error: u64,
    pub critical: u64,
    pub total: u64,
}

impl SeverityCounts {
    /// Builds counts from `(level code, count)` groups as returned by a
    /// `GROUP BY level` query.
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (i32, u64)>,
    {
        let mut counts = Self::default();
        for (code, count) in groups {
            if let Some(severity) = Severity::from_code(code) {
                *counts.bucket_mut(severity) += count;
            }
        }
        counts.total = Severity::ALL.iter().map(|s| counts.get(*s)).sum();
        counts
    }

    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Trace => self.trace,
            Severity::Debug => self.debug,
            Severity::Information => self.information,
            Severity::Warning => self.warning,
            Severity::Error => self.error,
            Severity::Critical => self.critical,
        }
    }

    fn bucket_mut(&mut self, severity: Severity) -> &mut u64 {
        match severity {
            Severity::Trace => &mut self.trace,
            Severity::Debug => &mut self.debug,
            Severity::Information => &mut self.information,
            Severity::Warning => &mut self.warning,
            Severity::Error => &mut self.error,
            Severity::Critical => &mut self.critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse() {
        assert_eq!(Severity::from_str("warn").unwrap(), Severity::Warning);
        assert_eq!(Severity::from_str("Information").unwrap(), Severity::Information);
        assert_eq!(Severity::from_str("4").unwrap(), Severity::Error);
        assert!(Severity::from_str("9").is_err());
        assert!(Severity::from_str("wat").is_err());
    }

    #[test]
    fn codes_round_trip_through_names() {
        for severity in Severity::ALL {
            assert_eq!(Severity::from_code(severity.code()), Some(severity));
        }
        assert_eq!(Severity::from_code(6), None);
        assert_eq!(Severity::from_code(-1), None);
    }

    #[test]
    fn empty_groups_serialize_all_buckets() {
        let counts = SeverityCounts::from_groups(Vec::new());
        let value = serde_json::to_value(counts).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys = obj.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "Critical",
                "Debug",
                "Error",
                "Information",
                "Total",
                "Trace",
                "Warning"
            ]
        );
        assert!(obj.values().all(|v| v.as_u64() == Some(0)));
    }

    #[test]
    fn unknown_codes_are_dropped_and_total_sums_buckets() {
        let counts = SeverityCounts::from_groups(vec![(2, 5), (4, 1), (9, 100), (-3, 7), (5, 2)]);
        assert_eq!(counts.information, 5);
        assert_eq!(counts.error, 1);
        assert_eq!(counts.critical, 2);
        assert_eq!(counts.total, 8);
        let sum: u64 = Severity::ALL.iter().map(|s| counts.get(*s)).sum();
        assert_eq!(counts.total, sum);
    }
}
