//! CD-1.1 time fields: 20 ASCII characters, `yyyyddd hh:mm:ss.mmm` (day of year, UTC).

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::{FrameError, Result};

/// Length of a timestamp field on the wire.
pub const TIMESTAMP_LEN: usize = 20;

/// Parse a `yyyyddd hh:mm:ss.mmm` timestamp.
///
/// A string of the wrong length is a [`FrameError::MalformedField`]; a string of
/// the right length whose fields are out of range is a
/// [`FrameError::MalformedTimestamp`].
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    if text.len() != TIMESTAMP_LEN {
        return Err(FrameError::malformed(
            "timestamp",
            format!("expected {TIMESTAMP_LEN} characters, got {}", text.len()),
        ));
    }

    let bad = || FrameError::MalformedTimestamp(text.to_string());
    let bytes = text.as_bytes();
    if !text.is_ascii() || bytes[7] != b' ' || bytes[10] != b':' || bytes[13] != b':' || bytes[16] != b'.' {
        return Err(bad());
    }

    let number = |range: std::ops::Range<usize>| -> Result<u32> {
        let part = &text[range];
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        part.parse::<u32>().map_err(|_| bad())
    };

    let year = number(0..4)?;
    let day_of_year = number(4..7)?;
    let hour = number(8..10)?;
    let minute = number(11..13)?;
    let second = number(14..16)?;
    let millis = number(17..20)?;

    if hour > 23 || minute > 59 || second > 59 {
        return Err(bad());
    }

    let date = NaiveDate::from_yo_opt(year as i32, day_of_year).ok_or_else(bad)?;
    let naive = date
        .and_hms_milli_opt(hour, minute, second, millis)
        .ok_or_else(bad)?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Format an instant as `yyyyddd hh:mm:ss.mmm`, truncating to milliseconds.
pub fn format_timestamp(value: &DateTime<Utc>) -> Result<String> {
    let year = value.year();
    if !(0..=9999).contains(&year) {
        return Err(FrameError::malformed(
            "timestamp",
            format!("year {year} does not fit in four digits"),
        ));
    }
    let millis = (value.nanosecond() / 1_000_000).min(999);
    Ok(format!(
        "{:04}{:03} {:02}:{:02}:{:02}.{:03}",
        year,
        value.ordinal(),
        value.hour(),
        value.minute(),
        value.second(),
        millis
    ))
}
