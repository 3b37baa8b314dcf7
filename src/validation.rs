//! Small validators shared by configuration loading and stimulus control.
use std::ops::RangeInclusive;

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates that a `[min, max]` pair describes a usable, finite interval.
pub fn is_ordered_bounds(min: f64, max: f64) -> Result<(), &'static str> {
    if !min.is_finite() || !max.is_finite() {
        return Err("Bounds must be finite");
    }
    if min > max {
        return Err("Lower bound must not exceed upper bound");
    }
    Ok(())
}

/// Validates an output channel or line name such as `Dev1/ao0` or `Dev1/port1/line1`.
///
/// # Returns
///
/// * `Ok(())` if the name is usable.
/// * `Err(&'static str)` if the name is empty or contains whitespace.
pub fn is_valid_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.chars().any(char::is_whitespace) {
        return Err("Channel name cannot contain whitespace");
    }
    Ok(())
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_check_is_inclusive() {
        assert!(is_in_range(0.0, 0.0..=5.0).is_ok());
        assert!(is_in_range(5.0, 0.0..=5.0).is_ok());
        assert!(is_in_range(5.01, 0.0..=5.0).is_err());
    }

    #[test]
    fn bounds_must_be_ordered_and_finite() {
        assert!(is_ordered_bounds(0.0, 6.0).is_ok());
        assert!(is_ordered_bounds(2.0, 2.0).is_ok());
        assert!(is_ordered_bounds(6.0, 0.0).is_err());
        assert!(is_ordered_bounds(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn channel_names() {
        assert!(is_valid_channel_name("Dev1/port1/line0").is_ok());
        assert!(is_valid_channel_name("").is_err());
        assert!(is_valid_channel_name("Dev1/ ao0").is_err());
    }
}
