//! String conversion and byte-order helpers shared by services.

use crate::error::{OsError, OsResult};

const SECOND_IN_MS: u32 = 1000;
const MINUTE_IN_MS: u32 = 60 * SECOND_IN_MS;
const HOUR_IN_MS: u32 = 60 * MINUTE_IN_MS;
const DAY_IN_MS: u32 = 24 * HOUR_IN_MS;
const WEEK_IN_MS: u32 = 7 * DAY_IN_MS;

/// Largest duration accepted, in milliseconds. `u32::MAX` is reserved for
/// "wait forever".
pub const MAX_DURATION_MS: u32 = u32::MAX - 1;

/// Largest size accepted, in bytes.
pub const MAX_SIZE_BYTES: u32 = u32::MAX;

const DURATION_FORMAT_HELP: &str = "This value may be expressed in milliseconds, seconds, \
minutes, hours, days, or weeks.  Its format is <Number>[s|m|h|d|w] where <Number> is an \
integer >= 0 and indicates milliseconds unless one of the following case-insensitive \
suffixes is specified:  s (for seconds), m (for minutes), h (for hours), d (for days), or \
w (for weeks).  The calculated value cannot exceed 4294967294 milliseconds.\n\n\
Examples: \n  100 specifies 100 milliseconds, \n  10s specifies 10 seconds, \n  \
5m specifies 5 minutes, \n  2h specifies 2 hours, \n  1d specifies 1 day, \n  \
1w specifies 1 week.";

const SIZE_FORMAT_HELP: &str = "This value may be expressed in bytes, kilobytes, or \
megabytes.  Its format is <Number>[k|m] where <Number> is an integer >= 0 and indicates \
bytes unless one of the following case-insensitive suffixes is specified:  k (for \
kilobytes) or m (for megabytes).  The calculated value cannot exceed 4294967295 bytes.\n\n\
Examples: \n  100000 specifies 100,000 bytes, \n  500k specifies 500 kilobytes (or \
512,000 bytes), \n  5m specifies 5 megabytes (or 5,242,880 bytes), \n  0 specifies no \
maximum size limit";

fn invalid_value(reason: impl Into<String>) -> OsError {
    OsError::InvalidValue {
        reason: reason.into(),
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parses `value` as an unsigned integer in `min..=max`.
///
/// `option` names the option in the error text; pass `""` when there is no
/// option.
pub fn convert_string_to_uint(value: &str, option: &str, min: u32, max: u32) -> OsResult<u32> {
    match value.trim().parse::<u32>() {
        Ok(n) if (min..=max).contains(&n) => Ok(n),
        _ if option.is_empty() => Err(invalid_value(format!(
            "The value must be an unsigned integer in range {min} to {max}.  \
             Invalid value: {value}"
        ))),
        _ => Err(invalid_value(format!(
            "The value for the {option} option must be an unsigned integer in range \
             {min} to {max}.  Invalid value: {value}"
        ))),
    }
}

/// Splits `<digits><suffix>` into the digits and the lower-cased suffix.
/// Bare digits yield no suffix.
fn split_unit(value: &str) -> Option<(&str, Option<char>)> {
    if is_digits(value) {
        return Some((value, None));
    }
    let suffix = value.chars().last()?;
    let number = &value[..value.len() - suffix.len_utf8()];
    if !is_digits(number) {
        return None;
    }
    Some((number, Some(suffix.to_ascii_lowercase())))
}

/// Converts `<n>[s|m|h|d|w]` into milliseconds. A bare number is already in
/// milliseconds.
pub fn convert_duration_string(value: &str) -> OsResult<u32> {
    let (number, unit) = split_unit(value).ok_or_else(|| invalid_value(DURATION_FORMAT_HELP))?;

    let (multiplier, max, unit_name) = match unit {
        None => (1, MAX_DURATION_MS, "milliseconds"),
        Some('s') => (SECOND_IN_MS, MAX_DURATION_MS / SECOND_IN_MS, "seconds"),
        Some('m') => (MINUTE_IN_MS, MAX_DURATION_MS / MINUTE_IN_MS, "minutes"),
        Some('h') => (HOUR_IN_MS, MAX_DURATION_MS / HOUR_IN_MS, "hours"),
        Some('d') => (DAY_IN_MS, MAX_DURATION_MS / DAY_IN_MS, "days"),
        Some('w') => (WEEK_IN_MS, MAX_DURATION_MS / WEEK_IN_MS, "weeks"),
        Some(_) => return Err(invalid_value(DURATION_FORMAT_HELP)),
    };

    match number.parse::<u32>() {
        Ok(n) if n <= max => Ok(n * multiplier),
        _ => Err(invalid_value(format!("Cannot exceed {max} {unit_name}."))),
    }
}

/// Converts `<n>[k|m]` into bytes. A bare number is already in bytes.
pub fn convert_size_string(value: &str) -> OsResult<u32> {
    let (number, unit) = split_unit(value).ok_or_else(|| invalid_value(SIZE_FORMAT_HELP))?;

    let (multiplier, max, unit_name) = match unit {
        None => (1, MAX_SIZE_BYTES, "bytes"),
        Some('k') => (1024, MAX_SIZE_BYTES / 1024, "kilobytes"),
        Some('m') => (1024 * 1024, MAX_SIZE_BYTES / (1024 * 1024), "megabytes"),
        Some(_) => return Err(invalid_value(SIZE_FORMAT_HELP)),
    };

    match number.parse::<u32>() {
        Ok(n) if n <= max => Ok(n * multiplier),
        _ => Err(invalid_value(format!("Cannot exceed {max} {unit_name}."))),
    }
}

/// Removes a trailing `@<port>` from an endpoint such as `tcp://host@6500`.
/// Anything after `@` that is not all digits is kept.
pub fn strip_port_from_endpoint(endpoint: &str) -> &str {
    match endpoint.find('@') {
        Some(at) if is_digits(&endpoint[at + 1..]) => &endpoint[..at],
        _ => endpoint,
    }
}

/// Reverses the byte order of `value`.
pub fn swap_uint(value: u32) -> u32 {
    value.swap_bytes()
}

/// Converts a native-order value to little-endian wire order.
pub fn native_to_le(value: u32) -> u32 {
    value.to_le()
}

/// Converts a little-endian wire value to native order.
pub fn le_to_native(value: u32) -> u32 {
    u32::from_le(value)
}
