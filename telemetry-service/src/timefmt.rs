//! Timestamp parsing shared by message normalization and query windows.

use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

const NAIVE_T: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
const NAIVE_SPACE: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]");

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TimestampError {
    #[error("unrecognised datetime '{0}'")]
    Format(String),
    #[error("epoch seconds {0} out of range")]
    Epoch(f64),
}

/// Parse an ISO-8601 datetime.
///
/// Inputs with an offset (`Z`, `+08:00`) are taken as-is; naive inputs are
/// interpreted in `local`. The result is expressed in `local`.
pub fn parse_datetime(s: &str, local: UtcOffset) -> Result<OffsetDateTime, TimestampError> {
    let s = s.trim();
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(ts.to_offset(local));
    }

    [NAIVE_T, NAIVE_SPACE]
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(s, fmt).ok())
        .map(|naive| naive.assume_offset(local))
        .ok_or_else(|| TimestampError::Format(s.to_string()))
}

/// Unix epoch seconds (fractional allowed) expressed in `local`.
pub fn from_epoch_seconds(secs: f64, local: UtcOffset) -> Result<OffsetDateTime, TimestampError> {
    if !secs.is_finite() {
        return Err(TimestampError::Epoch(secs));
    }
    let nanos = (secs * 1_000_000_000.0).round() as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map(|ts| ts.to_offset(local))
        .map_err(|_| TimestampError::Epoch(secs))
}
