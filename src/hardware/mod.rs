//! Hardware abstractions for the bench.
//!
//! - [`capabilities`]: the traits every stimulus and measurement device is used through
//! - [`mock`]: a simulated flip-flop fixture and scripted instrument ports
//! - [`serial`]: `InstrumentPort` over a serial line (feature `instrument_serial`)

pub mod capabilities;
pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod serial;

pub use capabilities::{AnalogOutput, DigitalOutput, InstrumentPort, WaveformCapture};
