use std::ops::RangeInclusive;

use crate::common::ProtocolError;

pub fn clamp<T: Ord + Copy>(value: T, range: &RangeInclusive<T>) -> T {
    if value < *range.start() {
        *range.start()
    } else if value > *range.end() {
        *range.end()
    } else {
        value
    }
}

/// Trims `value` and rejects it when empty or longer than `max_len` chars.
pub fn required_str(value: &str, field: &'static str, max_len: usize) -> Result<String, ProtocolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::InvalidInput(format!(
            "{field} is required, but got empty string"
        )));
    }
    if trimmed.chars().count() > max_len {
        return Err(ProtocolError::InvalidInput(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}
