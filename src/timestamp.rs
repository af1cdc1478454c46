use std::error::Error;
use std::fmt;

use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// Supplies the engine's notion of "now".
pub trait TimeSource {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Encodes `at` as fixed-width UTC text with nine fractional digits.
///
/// Every stored timestamp has the same shape, so SQLite string comparison
/// orders them chronologically.
pub fn encode(at: OffsetDateTime) -> String {
    let at = at.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:09}Z",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        at.nanosecond()
    )
}

/// Decodes any RFC 3339 timestamp and normalizes it to UTC.
pub fn decode(raw: &str) -> Result<OffsetDateTime, InvalidTimestamp> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map(|at| at.to_offset(UtcOffset::UTC))
        .map_err(|err| InvalidTimestamp {
            value: raw.to_string(),
            reason: err.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTimestamp {
    pub value: String,
    reason: String,
}

impl fmt::Display for InvalidTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid timestamp '{}': {}", self.value, self.reason)
    }
}

impl Error for InvalidTimestamp {}
