//! Custom error types for the bench.
//!
//! This module defines the primary error type, `BenchError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures a characterization run can hit, from configuration
//! problems to instruments that stop answering.
//!
//! ## Error Hierarchy
//!
//! `BenchError` separates failures by what the caller is expected to do about them:
//!
//! - **Transient** (`Communication`, `Timeout`, `MalformedReply`): a single instrument
//!   round-trip went wrong. `ValidatedReader` retries these locally and never lets them
//!   escape past its retry bound.
//! - **Fatal** (`OutputDevice`, `OutputRange`, `SweepAborted`): the stimulus device cannot
//!   be commanded, so the run cannot continue. Callers abort after attempting teardown.
//! - **Setup** (`Config`, `Configuration`, `Io`, `FeatureNotEnabled`): the bench could not
//!   be assembled in the first place.
//!
//! [`BenchError::is_fatal`] makes the fatal/non-fatal split explicit instead of leaving it
//! to whichever branch happened to catch the error.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the bench error type.
pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Communication error with '{instrument}': {message}")]
    Communication { instrument: String, message: String },

    #[error("Instrument '{instrument}' did not reply within {timeout:?}")]
    Timeout {
        instrument: String,
        timeout: Duration,
    },

    #[error("Malformed reply from '{instrument}': '{reply}'")]
    MalformedReply { instrument: String, reply: String },

    #[error("Output '{channel}' rejected command: {message}")]
    OutputDevice { channel: String, message: String },

    #[error("Voltage {value} V is outside the output range [{min}, {max}] V for '{channel}'")]
    OutputRange {
        channel: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Sweep aborted after {completed} points: {source}")]
    SweepAborted {
        completed: usize,
        #[source]
        source: Box<BenchError>,
    },

    #[error("Invalid waveform: {0}")]
    InvalidWaveform(String),

    #[error("Feature '{0}' is not enabled")]
    FeatureNotEnabled(String),

    #[cfg(feature = "instrument_serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl BenchError {
    /// Shorthand for a communication failure on a named instrument.
    pub fn communication(instrument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Communication {
            instrument: instrument.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a rejected output command.
    pub fn output(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutputDevice {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the run cannot continue.
    ///
    /// Read-side failures are recoverable: the sweep records them as indeterminate
    /// points. Anything that leaves the stimulus uncontrollable is not.
    pub fn is_fatal(&self) -> bool {
        match self {
            BenchError::Communication { .. }
            | BenchError::Timeout { .. }
            | BenchError::MalformedReply { .. }
            | BenchError::InvalidWaveform(_) => false,
            BenchError::OutputDevice { .. }
            | BenchError::OutputRange { .. }
            | BenchError::SweepAborted { .. }
            | BenchError::Config(_)
            | BenchError::Configuration(_)
            | BenchError::Io(_)
            | BenchError::FeatureNotEnabled(_) => true,
            #[cfg(feature = "instrument_serial")]
            BenchError::Serial(_) => true,
        }
    }
}
