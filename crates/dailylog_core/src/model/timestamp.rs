//! Fixed-width log timestamp codec.
//!
//! Logs carry their capture time as `HHMMSSDDMMYYYY` in local wall time.
//! Every field is zero padded, so two timestamps from the same day compare
//! correctly as strings. Across days the string order is meaningless; the
//! `Ord` impl here compares the decoded date-time instead.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

const ENCODED_LEN: usize = 14;
const LEGACY_SHORT_LEN: usize = 12;

/// Timestamp decoding failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampError {
    value: String,
}

impl Display for TimestampError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid log timestamp `{}`", self.value)
    }
}

impl Error for TimestampError {}

/// Validated `HHMMSSDDMMYYYY` timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogTimestamp {
    encoded: String,
    at: NaiveDateTime,
}

impl LogTimestamp {
    /// Encodes a local wall-clock time.
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        let at = at.with_nanosecond(0).unwrap_or(at);
        Self {
            encoded: at.format("%H%M%S%d%m%Y").to_string(),
            at,
        }
    }

    /// Parses the canonical 14 character encoding.
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        let invalid = || TimestampError {
            value: value.to_string(),
        };
        if value.len() != ENCODED_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let field = |range: std::ops::Range<usize>| value[range].parse::<u32>().map_err(|_| invalid());
        let time = NaiveTime::from_hms_opt(field(0..2)?, field(2..4)?, field(4..6)?).ok_or_else(invalid)?;
        let year = i32::try_from(field(10..14)?).map_err(|_| invalid())?;
        let date = NaiveDate::from_ymd_opt(year, field(8..10)?, field(6..8)?).ok_or_else(invalid)?;
        Ok(Self::from_datetime(date.and_time(time)))
    }

    /// Parses canonical or legacy timestamp shapes found in old data files.
    ///
    /// Accepted:
    /// - `HHMMSSDDMMYYYY`
    /// - `HHMMSSDDMMYY`, read as year 2000 + YY
    /// - ISO-8601 date-time containing `T` (offset ignored, wall time kept)
    pub fn parse_legacy(value: &str) -> Result<Self, TimestampError> {
        let trimmed = value.trim();
        if trimmed.contains('T') {
            return parse_iso(trimmed).ok_or_else(|| TimestampError {
                value: value.to_string(),
            });
        }
        if trimmed.len() == LEGACY_SHORT_LEN && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            let expanded = format!("{}20{}", &trimmed[..10], &trimmed[10..]);
            return Self::parse(&expanded).map_err(|_| TimestampError {
                value: value.to_string(),
            });
        }
        Self::parse(trimmed)
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Calendar date the log belongs to.
    pub fn date(&self) -> NaiveDate {
        self.at.date()
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.at
    }
}

fn parse_iso(value: &str) -> Option<LogTimestamp> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(LogTimestamp::from_datetime(parsed.naive_local()));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(LogTimestamp::from_datetime)
}

impl Ord for LogTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at)
    }
}

impl PartialOrd for LogTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for LogTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl TryFrom<String> for LogTimestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LogTimestamp> for String {
    fn from(value: LogTimestamp) -> Self {
        value.encoded
    }
}

#[cfg(test)]
mod tests {
    use super::LogTimestamp;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    #[test]
    fn encodes_fixed_width_zero_padded_fields() {
        let ts = LogTimestamp::from_datetime(at(2024, 3, 7, 9, 5, 1));
        assert_eq!(ts.as_str(), "09050107032024");
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
    }

    #[test]
    fn parse_rejects_wrong_width_and_impossible_dates() {
        assert!(LogTimestamp::parse("0905010703202").is_err());
        assert!(LogTimestamp::parse("09050107032024x").is_err());
        assert!(LogTimestamp::parse("25050107032024").is_err());
        assert!(LogTimestamp::parse("09050131022024").is_err());
    }

    #[test]
    fn same_day_string_order_matches_time_order() {
        let early = LogTimestamp::from_datetime(at(2024, 3, 7, 8, 0, 0));
        let late = LogTimestamp::from_datetime(at(2024, 3, 7, 21, 30, 0));
        assert!(early.as_str() < late.as_str());
        assert!(early < late);
    }

    #[test]
    fn ordering_across_days_uses_decoded_time() {
        let earlier_day_late_hour = LogTimestamp::from_datetime(at(2024, 3, 6, 23, 0, 0));
        let later_day_early_hour = LogTimestamp::from_datetime(at(2024, 3, 7, 1, 0, 0));
        assert!(earlier_day_late_hour < later_day_early_hour);
    }

    #[test]
    fn legacy_shapes_are_normalized() {
        let short = LogTimestamp::parse_legacy("101500070324").unwrap();
        assert_eq!(short.as_str(), "10150007032024");

        let iso = LogTimestamp::parse_legacy("2024-03-07T10:15:00.123456").unwrap();
        assert_eq!(iso.as_str(), "10150007032024");

        assert!(LogTimestamp::parse_legacy("yesterday").is_err());
    }

    #[test]
    fn serde_uses_encoded_string() {
        let ts = LogTimestamp::from_datetime(at(2024, 12, 31, 23, 59, 59));
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"23595931122024\"");
        let back: LogTimestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
