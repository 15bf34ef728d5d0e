//! Lenient field readers for records written by older versions of the bot.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, LEGACY_TIMESTAMP_FORMAT)
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(as_text(&json!(42)).as_deref(), Some("42"));
        assert_eq!(as_text(&json!("x")).as_deref(), Some("x"));
        assert_eq!(as_text(&json!(null)), None);
        assert_eq!(as_u64(&json!("150")), Some(150));
        assert_eq!(as_u64(&json!(12.0)), Some(12));
        assert_eq!(as_u64(&json!(true)), None);
    }

    #[test]
    fn test_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(as_timestamp(&json!("2024-03-01 12:30:00")), Some(expected));
        assert_eq!(as_timestamp(&json!("2024-03-01T12:30:00Z")), Some(expected));
        assert_eq!(as_timestamp(&json!("yesterday")), None);
    }
}
