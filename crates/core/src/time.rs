use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{LogbookError, Result};

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"];

/// Accepts RFC3339, a naive timestamp (read as UTC), or a duration such as
/// `15m` meaning that long before now.
pub fn parse_time_or_relative(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        return Ok(Utc::now()
            - chrono::Duration::from_std(duration).map_err(|e| {
                LogbookError::Parse(format!("failed to parse duration to chrono: {e}"))
            })?);
    }

    Err(LogbookError::Parse(format!(
        "expected RFC3339 time, naive timestamp or duration, got {input}"
    )))
}
