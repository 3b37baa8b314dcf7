//! # Logic Bench Core Library
//!
//! Automated bench characterization of a JK flip-flop fixture: a DAQ card drives the
//! inputs, a multimeter and an oscilloscope observe the output, and this crate turns
//! the raw readings into logic thresholds, propagation delays and supply currents.
//!
//! ## Crate Structure
//!
//! - **`hardware`**: capability traits for every device (`AnalogOutput`, `DigitalOutput`,
//!   `InstrumentPort`, `WaveformCapture`), the serial transport and a simulated fixture.
//! - **`measurement`**: reply parsing and the bounded-retry `ValidatedReader`.
//! - **`stimulus`**: range-checked output control and clock/clear pulses.
//! - **`sweep`**: the voltage-sweep engine, transition detection and hysteresis.
//! - **`waveform`**: threshold-crossing and propagation-delay analysis.
//! - **`instrument`**: command layers for the Fluke 45, the Tektronix scope and the SPD3303.
//! - **`procedures`**: function table, supply currents, propagation delay, setup time.
//! - **`session`**: the `Bench` context object tying it all together.
//! - **`config`**, **`logging`**, **`error`**, **`validation`**: the ambient stack.

pub mod config;
pub mod error;
pub mod hardware;
pub mod instrument;
pub mod logging;
pub mod measurement;
pub mod procedures;
pub mod session;
pub mod stimulus;
pub mod sweep;
pub mod validation;
pub mod waveform;

pub use error::{BenchError, BenchResult};
pub use session::Bench;
