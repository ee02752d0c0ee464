//! Archive Time
//!
//! Archive timestamps count EPICS ticks since the Unix epoch, with
//! [`EPICS_SECOND`] ticks per second. Human-readable times use the format
//! `yyyy-mm-dd HH:MM[:SS][+0.X]`, interpreted in a named time zone.

use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use thiserror::Error;

/// Archive ticks per second
pub const EPICS_SECOND: i64 = 1 << 28;

const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Time conversion errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("invalid time '{0}': expected yyyy-mm-dd HH:MM[:SS][+0.X] or a tick count")]
    Format(String),

    #[error("local time '{time}' does not exist or is ambiguous in {zone}")]
    Ambiguous { time: String, zone: String },

    #[error("unknown time zone '{0}'")]
    UnknownZone(String),

    #[error("timestamp {0} is out of range")]
    OutOfRange(i64),
}

/// Resolve an IANA time zone name such as `America/New_York`
pub fn zone(name: &str) -> Result<Tz, TimeError> {
    name.parse::<Tz>()
        .map_err(|_| TimeError::UnknownZone(name.to_string()))
}

/// Convert a time string or raw tick count to archive ticks
///
/// # Examples
///
/// ```rust
/// use archiveql::time::{parse_time, EPICS_SECOND};
///
/// let utc = chrono_tz::UTC;
/// assert_eq!(parse_time("1970-01-01 00:00:01", utc).unwrap(), EPICS_SECOND);
/// assert_eq!(parse_time("1970-01-01 00:00:01+0.5", utc).unwrap(), EPICS_SECOND * 3 / 2);
/// assert_eq!(parse_time("42", utc).unwrap(), 42);
/// ```
pub fn parse_time(text: &str, tz: Tz) -> Result<i64, TimeError> {
    let text = text.trim();
    if let Ok(ticks) = text.parse::<i64>() {
        return Ok(ticks);
    }

    let (stamp, fraction) = match text.split_once('+') {
        Some((stamp, fraction)) => {
            let fraction: f64 = fraction
                .trim()
                .parse()
                .map_err(|_| TimeError::Format(text.to_string()))?;
            if !(0.0..1.0).contains(&fraction) {
                return Err(TimeError::Format(text.to_string()));
            }
            (stamp.trim_end(), fraction)
        }
        None => (text, 0.0),
    };

    let naive = FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(stamp, format).ok())
        .ok_or_else(|| TimeError::Format(text.to_string()))?;

    let local = tz
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| TimeError::Ambiguous {
            time: stamp.to_string(),
            zone: tz.name().to_string(),
        })?;

    let seconds = local.timestamp();
    seconds
        .checked_mul(EPICS_SECOND)
        .and_then(|ticks| ticks.checked_add((fraction * EPICS_SECOND as f64).floor() as i64))
        .ok_or(TimeError::OutOfRange(seconds))
}

/// Render archive ticks as `yyyy-mm-dd HH:MM:SS` in the given zone
///
/// With `fraction`, the sub-second part is appended as `+0.X`.
pub fn format_time(ticks: i64, fraction: bool, tz: Tz) -> Result<String, TimeError> {
    let seconds = ticks.div_euclid(EPICS_SECOND);
    let remainder = ticks.rem_euclid(EPICS_SECOND);

    let utc = DateTime::from_timestamp(seconds, 0).ok_or(TimeError::OutOfRange(ticks))?;
    let mut text = utc.with_timezone(&tz).format(FORMATS[0]).to_string();
    if fraction {
        text.push('+');
        text.push_str(&(remainder as f64 / EPICS_SECOND as f64).to_string());
    }
    Ok(text)
}
