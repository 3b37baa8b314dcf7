//! Command layers for the bench instruments.
//!
//! Each driver is a thin wrapper over an [`InstrumentPort`](crate::hardware::InstrumentPort):
//! it knows which commands to send and how to read the replies, nothing more.
//! Retrying and range validation belong to
//! [`ValidatedReader`](crate::measurement::ValidatedReader).

pub mod function_generator;
pub mod multimeter;
pub mod oscilloscope;
pub mod power_supply;

pub use function_generator::{Afg2005, GeneratorState, SquareWave};
pub use multimeter::Fluke45;
pub use oscilloscope::{ScopeSetup, TekScope, TriggerMode, TriggerSlope};
pub use power_supply::Spd3303;

use crate::error::{BenchError, BenchResult};

/// Parse a numeric query reply.
///
/// Unlike [`parse_scalar`](crate::measurement::parse_scalar) this is strict: the whole
/// trimmed reply must be a number, otherwise the reply is malformed.
pub fn parse_f64_response(instrument: &str, response: &str) -> BenchResult<f64> {
    response
        .trim()
        .parse::<f64>()
        .map_err(|_| BenchError::MalformedReply {
            instrument: instrument.to_string(),
            reply: response.trim().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_numeric_replies() {
        assert_eq!(parse_f64_response("scope", " 4.0E-10\n").unwrap(), 4.0e-10);
        let err = parse_f64_response("scope", "ERR").unwrap_err();
        assert!(matches!(err, BenchError::MalformedReply { .. }));
        assert!(!err.is_fatal());
    }
}
