//! Numeric token extraction for instrument replies.
//!
//! Some meters answer a single query with the value printed twice and no separator,
//! e.g. `+22.009E+3+22.009E+3`. The first scientific-notation token is the reading.

use once_cell::sync::Lazy;
use regex::Regex;

static SCIENTIFIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+-]?\d+\.\d+E[+-]?\d+").expect("Invalid scalar token regex"));

/// First `[+-]?d+.d+E[+-]?d+` token in the trimmed reply, or the trimmed reply itself.
///
/// Never fails; callers decide whether the result parses.
pub fn extract_scalar(raw: &str) -> &str {
    let trimmed = raw.trim();
    SCIENTIFIC_TOKEN
        .find(trimmed)
        .map_or(trimmed, |m| m.as_str())
}

/// [`extract_scalar`] followed by a float parse.
pub fn parse_scalar(raw: &str) -> Option<f64> {
    extract_scalar(raw).parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicated_reply_yields_first_token() {
        assert_eq!(extract_scalar("+22.009E+3+22.009E+3"), "+22.009E+3");
        assert_eq!(parse_scalar("+22.009E+3+22.009E+3"), Some(22009.0));
    }

    #[test]
    fn plain_numbers_pass_through() {
        assert_eq!(extract_scalar("3.3"), "3.3");
        assert_eq!(extract_scalar("  3.3\r\n"), "3.3");
        assert_eq!(parse_scalar("3.3"), Some(3.3));
    }

    #[test]
    fn empty_and_garbage() {
        assert_eq!(extract_scalar(""), "");
        assert_eq!(parse_scalar(""), None);
        assert_eq!(extract_scalar("OVLD"), "OVLD");
        assert_eq!(parse_scalar("OVLD"), None);
    }

    #[test]
    fn negative_exponent_and_sign() {
        assert_eq!(extract_scalar("-1.250E-3-1.250E-3"), "-1.250E-3");
        assert_eq!(parse_scalar("-1.250E-3"), Some(-0.00125));
    }
}
