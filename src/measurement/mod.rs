//! Instrument replies turned into validated scalar readings.
//!
//! - [`parser`] extracts the numeric token from a raw reply.
//! - [`reader`] wraps a single instrument round-trip in the bounded retry protocol.
//!
//! The output of both is a [`Reading`]: either a value inside the caller's window, or
//! a failure that still carries what the last attempt actually saw.

pub mod parser;
pub mod reader;

use serde::Serialize;
use std::fmt;

pub use parser::{extract_scalar, parse_scalar};
pub use reader::{ReadBounds, ValidatedReader};

/// What the final attempt of an exhausted read produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LastReply {
    /// Parsed, but outside `[min, max]`
    OutOfRange(f64),
    /// Reply text that is not a number
    Unparsable(String),
    /// The round-trip itself failed, or no attempt was made
    NoReply,
}

impl fmt::Display for LastReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastReply::OutOfRange(v) => write!(f, "{v} (out of range)"),
            LastReply::Unparsable(s) => write!(f, "'{s}' (unparsable)"),
            LastReply::NoReply => f.write_str("no reply"),
        }
    }
}

/// Result of one validated read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reading {
    Valid { value: f64, attempts: u32 },
    Failed { last: LastReply, attempts: u32 },
}

impl Reading {
    /// The accepted value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Valid { value, .. } => Some(*value),
            Reading::Failed { .. } => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Reading::Valid { .. })
    }

    /// Round-trips consumed, including the successful one.
    pub fn attempts(&self) -> u32 {
        match self {
            Reading::Valid { attempts, .. } | Reading::Failed { attempts, .. } => *attempts,
        }
    }

    /// The number the instrument last reported, valid or not.
    ///
    /// Lets a results table show the out-of-range value that caused a failure.
    pub fn last_value(&self) -> Option<f64> {
        match self {
            Reading::Valid { value, .. } => Some(*value),
            Reading::Failed {
                last: LastReply::OutOfRange(v),
                ..
            } => Some(*v),
            Reading::Failed { .. } => None,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Valid { value, .. } => write!(f, "{value:.4}"),
            Reading::Failed { last, attempts } => {
                write!(f, "failed after {attempts} attempts: {last}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let ok = Reading::Valid {
            value: 3.4,
            attempts: 2,
        };
        assert_eq!(ok.value(), Some(3.4));
        assert_eq!(ok.attempts(), 2);
        assert!(ok.is_valid());

        let bad = Reading::Failed {
            last: LastReply::OutOfRange(9.0),
            attempts: 3,
        };
        assert_eq!(bad.value(), None);
        assert_eq!(bad.last_value(), Some(9.0));
        assert!(!bad.is_valid());
        assert!(bad.to_string().contains("out of range"));
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(Reading::Failed {
            last: LastReply::NoReply,
            attempts: 0,
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["last"]["kind"], "no_reply");
    }
}
