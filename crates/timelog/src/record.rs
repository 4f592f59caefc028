//! Record line format and timestamp conversion.
//!
//! A record occupies exactly one line of the data file:
//!
//! ```text
//! <epoch-seconds> <payload>\n
//! ```
//!
//! The first space separates the timestamp from the payload; the payload
//! itself may contain further spaces but never `\r` or `\n`.

use crate::error::{Result, TimelogError};
use chrono::{DateTime, TimeZone, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch. The key domain of both files.
pub type Timestamp = i64;

/// Line terminator written after every record and index entry.
pub const LINE_TERMINATOR: char = '\n';

/// A single stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record time in epoch seconds.
    pub timestamp: Timestamp,
    /// Record content, without the timestamp prefix or terminator.
    pub payload: String,
}

impl Record {
    /// Creates a record after validating the payload.
    pub fn new(timestamp: Timestamp, payload: impl Into<String>) -> Result<Self> {
        let payload = payload.into();
        validate_payload(&payload)?;
        Ok(Self { timestamp, payload })
    }

    /// Serializes the record as one data file line, terminator included.
    pub fn to_line(&self) -> String {
        encode_line(self.timestamp, &self.payload)
    }

    /// Parses a data file line with the terminator already stripped.
    pub fn parse_line(line: &str) -> Result<Self> {
        let (ts, payload) = line
            .split_once(' ')
            .ok_or_else(|| TimelogError::malformed(line, "missing timestamp separator"))?;
        let timestamp = ts
            .parse::<Timestamp>()
            .map_err(|_| TimelogError::malformed(line, "timestamp is not an integer"))?;
        if payload.is_empty() {
            return Err(TimelogError::malformed(line, "empty payload"));
        }
        Ok(Self {
            timestamp,
            payload: payload.to_string(),
        })
    }
}

/// Rejects payloads that cannot be stored as a single line.
pub fn validate_payload(payload: &str) -> Result<()> {
    if payload.is_empty() {
        return Err(TimelogError::invalid("payload is empty"));
    }
    if payload.contains(|c| c == '\r' || c == '\n') {
        return Err(TimelogError::invalid("payload contains a line terminator"));
    }
    Ok(())
}

pub(crate) fn encode_line(timestamp: Timestamp, payload: &str) -> String {
    format!("{timestamp} {payload}{LINE_TERMINATOR}")
}

/// Strips a trailing `\n` or `\r\n`. Returns `None` if the line is unterminated.
pub(crate) fn strip_terminator(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\n')?;
    Some(line.strip_suffix('\r').unwrap_or(line))
}

/// Reads the leading timestamp of a data line without copying the payload.
pub(crate) fn leading_timestamp(line: &str) -> Option<Timestamp> {
    let (ts, _) = line.split_once(' ')?;
    ts.parse().ok()
}

/// Conversion of calendar-time values into epoch seconds.
///
/// Sub-second precision is truncated toward negative infinity, so every
/// instant inside a second maps to that second.
pub trait ToEpochSeconds {
    /// Returns the value as seconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns [`TimelogError::InvalidArgument`] if the value is not a valid
    /// date/time.
    fn to_epoch_seconds(&self) -> Result<Timestamp>;
}

impl<Tz: TimeZone> ToEpochSeconds for DateTime<Tz> {
    fn to_epoch_seconds(&self) -> Result<Timestamp> {
        Ok(self.timestamp())
    }
}

/// Rounds toward negative infinity, like [`DateTime::timestamp`]. Times
/// outside the range of [`DateTime<Utc>`] are rejected.
impl ToEpochSeconds for SystemTime {
    fn to_epoch_seconds(&self) -> Result<Timestamp> {
        let out_of_range = || TimelogError::invalid(format!("{self:?} is out of range"));
        let secs = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => Timestamp::try_from(after.as_secs()).map_err(|_| out_of_range())?,
            Err(e) => {
                let before = e.duration();
                let whole = Timestamp::try_from(before.as_secs()).map_err(|_| out_of_range())?;
                if before.subsec_nanos() > 0 {
                    -whole - 1
                } else {
                    -whole
                }
            }
        };
        DateTime::<Utc>::from_timestamp(secs, 0)
            .map(|dt| dt.timestamp())
            .ok_or_else(out_of_range)
    }
}

/// Parses an RFC 3339 timestamp such as `2024-01-01T00:00:00Z`.
impl ToEpochSeconds for str {
    fn to_epoch_seconds(&self) -> Result<Timestamp> {
        DateTime::parse_from_rfc3339(self.trim())
            .map(|dt| dt.timestamp())
            .map_err(|e| TimelogError::invalid(format!("{self:?} is not a date/time: {e}")))
    }
}

impl ToEpochSeconds for String {
    fn to_epoch_seconds(&self) -> Result<Timestamp> {
        self.as_str().to_epoch_seconds()
    }
}

impl<T: ToEpochSeconds + ?Sized> ToEpochSeconds for &T {
    fn to_epoch_seconds(&self) -> Result<Timestamp> {
        (**self).to_epoch_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_record_line_roundtrip_keeps_inner_spaces() {
        let record = Record::new(1_700_000_000, "42 cpu load high").unwrap();
        let line = record.to_line();
        assert_eq!(line, "1700000000 42 cpu load high\n");

        let parsed = Record::parse_line(strip_terminator(&line).unwrap()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_validate_payload() {
        assert!(validate_payload("ok").is_ok());
        assert!(validate_payload("").unwrap_err().is_invalid_argument());
        assert!(validate_payload("line1\nline2")
            .unwrap_err()
            .is_invalid_argument());
        assert!(validate_payload("carriage\rreturn")
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_parse_line_malformed() {
        for line in ["", "100", "abc payload", "100 ", "1.5 payload"] {
            let err = Record::parse_line(line).unwrap_err();
            assert!(
                matches!(err, TimelogError::MalformedLine { .. }),
                "{line:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator("100 a\n"), Some("100 a"));
        assert_eq!(strip_terminator("100 a\r\n"), Some("100 a"));
        assert_eq!(strip_terminator("100 a"), None);
    }

    #[test]
    fn test_leading_timestamp() {
        assert_eq!(leading_timestamp("-5 before epoch"), Some(-5));
        assert_eq!(leading_timestamp("300 c"), Some(300));
        assert_eq!(leading_timestamp("garbage"), None);
    }

    #[test]
    fn test_to_epoch_seconds() {
        let dt = Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap();
        assert_eq!(dt.to_epoch_seconds().unwrap(), 1_700_000_000);

        let st = UNIX_EPOCH + Duration::from_millis(1500);
        assert_eq!(st.to_epoch_seconds().unwrap(), 1);
        let st = UNIX_EPOCH - Duration::from_millis(1500);
        assert_eq!(st.to_epoch_seconds().unwrap(), -2);
        let st = UNIX_EPOCH - Duration::from_secs(3);
        assert_eq!(st.to_epoch_seconds().unwrap(), -3);

        assert_eq!(
            "1970-01-01T00:01:40Z".to_epoch_seconds().unwrap(),
            100
        );
        assert_eq!(
            "1970-01-01T01:00:00+01:00".to_epoch_seconds().unwrap(),
            0
        );
        assert!("not-a-date"
            .to_epoch_seconds()
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_system_time_out_of_range_is_rejected() {
        // Representable as a SystemTime on 64-bit targets, but past year 262143.
        let Some(far) = UNIX_EPOCH.checked_add(Duration::from_secs(1 << 45)) else {
            return;
        };
        assert!(far.to_epoch_seconds().unwrap_err().is_invalid_argument());

        let near = UNIX_EPOCH + Duration::from_secs(1 << 40);
        assert_eq!(near.to_epoch_seconds().unwrap(), 1 << 40);
    }
}
