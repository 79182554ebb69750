//! Conversion of user-facing time values to the internal representation.
//!
//! Internally every timestamp is a 64-bit count of milliseconds since the
//! Unix epoch, UTC. Callers may hand in ready-made millisecond counts,
//! `chrono` datetimes (naive values are taken as UTC), or text parsed with
//! a strftime-style format string.
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::*;

/// The "not a time" sentinel for millisecond timestamps, the temporal
/// counterpart of NaN on the float vectors.
pub const NOT_A_TIME: i64 = i64::MIN;

/// The format used for time bound strings unless the caller overrides it.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A user-supplied point in time in any of the accepted forms.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeValue {
    /// Milliseconds since the Unix epoch, UTC.
    Millis(i64),
    /// A timezone-aware datetime.
    DateTime(DateTime<Utc>),
    /// A naive datetime, interpreted as UTC.
    Naive(NaiveDateTime),
    /// A text timestamp, parsed with the configured format string as UTC.
    Text(String),
}

impl From<i64> for TimeValue {
    fn from(ms: i64) -> Self {
        TimeValue::Millis(ms)
    }
}

impl From<DateTime<Utc>> for TimeValue {
    fn from(dt: DateTime<Utc>) -> Self {
        TimeValue::DateTime(dt)
    }
}

impl From<NaiveDateTime> for TimeValue {
    fn from(dt: NaiveDateTime) -> Self {
        TimeValue::Naive(dt)
    }
}

impl From<&str> for TimeValue {
    fn from(s: &str) -> Self {
        TimeValue::Text(s.to_string())
    }
}

/// Convert any accepted time form to millisecond UTC.
/// ```
/// use echogram_core::timestamp::{to_millis, TimeValue, DEFAULT_TIME_FORMAT};
///
/// let ms = to_millis(&TimeValue::from("1970-01-01 00:00:01"), DEFAULT_TIME_FORMAT).unwrap();
/// assert_eq!(ms, 1_000);
///
/// let verbatim = to_millis(&TimeValue::Millis(42), DEFAULT_TIME_FORMAT).unwrap();
/// assert_eq!(verbatim, 42);
/// ```
pub fn to_millis(value: &TimeValue, format: &str) -> Result<i64, EchoError> {
    match value {
        TimeValue::Millis(ms) => Ok(*ms),
        TimeValue::DateTime(dt) => Ok(dt.timestamp_millis()),
        TimeValue::Naive(dt) => Ok(dt.and_utc().timestamp_millis()),
        TimeValue::Text(text) => parse_time_str(text, format),
    }
}

/// Parse a text timestamp with a strftime-style format, interpreted as UTC.
pub fn parse_time_str(text: &str, format: &str) -> Result<i64, EchoError> {
    let naive = NaiveDateTime::parse_from_str(text, format).map_err(|_| {
        EchoError::InvalidTimeString {
            input: text.to_string(),
            format: format.to_string(),
        }
    })?;
    Ok(naive.and_utc().timestamp_millis())
}

/// Convert a millisecond timestamp back to a UTC datetime, if it is neither
/// the [`NOT_A_TIME`] sentinel nor out of the representable range.
pub fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    if ms == NOT_A_TIME {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(ms)
}
