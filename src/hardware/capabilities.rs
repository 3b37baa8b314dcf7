//! Atomic Hardware Capabilities
//!
//! Fine-grained capability traits the bench is written against. Instead of one
//! monolithic "instrument" type, each device implements only what it can do:
//!
//! - A DAQ card implements: `AnalogOutput + DigitalOutput`
//! - A multimeter or power supply is reached through an `InstrumentPort`
//! - An oscilloscope implements: `WaveformCapture`
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is synchronous: every call is a blocking request/response, and the next step of
//!   a sweep causally depends on the previous one having physically completed
//! - Is `Send`, so a bench can be moved onto a worker thread as a whole
//! - Returns `BenchResult`, so transient and fatal failures stay distinguishable
//! - Takes `&mut self`: holding the handle is holding exclusive access to the device
//!
//! # Example
//!
//! ```rust,ignore
//! fn drive_high<T: AnalogOutput + DigitalOutput>(daq: &mut T) -> BenchResult<()> {
//!     daq.set_voltage("Dev1/ao0", 5.0)?;
//!     daq.set_line("Dev1/port1/line0", true)?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use crate::error::BenchResult;
use crate::waveform::Waveform;

/// Capability: Command/Reply Instrument Link
///
/// A text command channel to one instrument (multimeter, supply, oscilloscope).
///
/// # Contract
/// - `write` sends a command and returns once it has been handed to the transport
/// - `query` sends a command and returns the reply with terminators stripped
/// - A missing or late reply is `BenchError::Timeout` or `BenchError::Communication`
pub trait InstrumentPort: Send {
    /// Identifier used in logs and error messages
    fn id(&self) -> &str;

    /// Send a command that produces no reply
    fn write(&mut self, command: &str) -> BenchResult<()>;

    /// Send a command and read its reply
    fn query(&mut self, command: &str) -> BenchResult<String>;

    /// Change the reply timeout
    ///
    /// # Default Implementation
    /// Ignores the request; ports without a timeout concept never block.
    fn set_timeout(&mut self, _timeout: Duration) -> BenchResult<()> {
        Ok(())
    }
}

/// Capability: Analog Output
///
/// DAC channels addressed by name (e.g. `Dev1/ao0`).
///
/// # Contract
/// - Returns once the device has acknowledged the write
/// - Range checking against the fixture's declared window is the caller's job
///   (`StimulusController` does it before calling)
pub trait AnalogOutput: Send {
    /// Drive `channel` to `volts`
    fn set_voltage(&mut self, channel: &str, volts: f64) -> BenchResult<()>;
}

/// Capability: Digital Output
///
/// Individual output lines addressed by name (e.g. `Dev1/port1/line1`).
pub trait DigitalOutput: Send {
    /// Drive `line` high (`true`) or low (`false`)
    fn set_line(&mut self, line: &str, high: bool) -> BenchResult<()>;
}

/// Capability: Waveform Capture
///
/// Devices that return a digitized trace for a numbered input channel.
///
/// # Contract
/// - The returned waveform has equal-length time and voltage vectors
/// - Timestamps are monotonically non-decreasing
pub trait WaveformCapture: Send {
    /// Read the current acquisition of `channel` (1-based, as printed on the front panel)
    fn capture(&mut self, channel: u8) -> BenchResult<Waveform>;
}

impl<T: InstrumentPort + ?Sized> InstrumentPort for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn write(&mut self, command: &str) -> BenchResult<()> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> BenchResult<String> {
        (**self).query(command)
    }

    fn set_timeout(&mut self, timeout: Duration) -> BenchResult<()> {
        (**self).set_timeout(timeout)
    }
}
