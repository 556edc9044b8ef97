use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

/// Fixed-width UTC timestamp, so text order in SQLite equals time order.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn encode_reasons(reasons: &[String]) -> Result<String> {
    serde_json::to_string(reasons).context("failed to serialize posture reasons")
}

pub fn decode_reasons(value: &str) -> Result<Vec<String>> {
    serde_json::from_str(value).context("failed to parse posture reasons")
}

/// Wraps a decoding failure inside a row-mapping closure.
pub fn invalid_data(err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            err.to_string(),
        )),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_round_trip() {
        let whole = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::microseconds(1_500);

        let a = format_timestamp(whole);
        let b = format_timestamp(fractional);

        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_datetime(&b, "captured_at").unwrap(), fractional);
    }

    #[test]
    fn reasons_keep_their_order() {
        let reasons = vec!["neck extended".to_string(), "head lowered".to_string()];
        let encoded = encode_reasons(&reasons).unwrap();
        assert_eq!(decode_reasons(&encoded).unwrap(), reasons);
    }
}
