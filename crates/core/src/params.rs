//! Lenient deserializers for request parameters.
//!
//! Query strings carry every value as text and HTML forms send empty fields
//! (`from=`), while the JSON line protocol carries typed values and `null`.
//! These helpers accept both and read blank text as an absent value.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error;
use serde::{Deserialize, Deserializer};

use crate::time::parse_time_or_relative;

pub fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Value(T),
        Text(String),
    }

    match Option::<Raw<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Value(v)) => Ok(Some(v)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
    }
}

pub fn blank_str_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

pub fn blank_time_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match blank_str_as_none(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_time_or_relative(&raw)
            .map(Some)
            .map_err(D::Error::custom),
    }
}

/// Keeps the fact that a key was sent even when its value is blank:
/// `None` means absent, `Some(None)` means present but empty (`from=`).
/// Pair with `#[serde(default)]`.
pub fn present_time<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    blank_time_as_none(deserializer).map(Some)
}
