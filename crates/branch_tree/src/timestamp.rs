//! Lenient timestamp (de)serialization.
//!
//! Accepts RFC 3339 and naive ISO-8601 (`2024-05-01T10:00:00.123456`, read as
//! UTC). Anything else, including `null` or a missing field, becomes the load
//! time so that one bad timestamp never invalidates a whole document.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn parse_lenient(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = match raw {
        Some(serde_json::Value::String(text)) => parse_lenient(&text),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(|| {
        tracing::debug!("unreadable timestamp replaced with load time");
        Utc::now()
    }))
}
