//! Stimulus control for the device under test.
//!
//! [`StimulusController`] owns the analog and digital output capabilities of the DAQ
//! card and is the only path by which the bench changes what the DUT sees. Every
//! operation is synchronous: it returns once the device has accepted the write.
//!
//! Analog writes are checked against the fixture's declared [`OutputRange`] before
//! anything reaches the device. Digital lines are pulsed through a [`PulseSpec`], whose
//! active phase is held by an [`ActivePhase`] guard that returns the line to idle when
//! dropped, whatever happened while it was active.

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{trace, warn};

use crate::error::{BenchError, BenchResult};
use crate::hardware::capabilities::{AnalogOutput, DigitalOutput};

/// A level to drive an output to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Level {
    /// Analog output voltage
    Volts(f64),
    /// Digital line state, `true` = high
    Logic(bool),
}

/// Declared analog output window, in volts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputRange {
    pub min: f64,
    pub max: f64,
}

impl OutputRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, volts: f64) -> bool {
        (self.min..=self.max).contains(&volts)
    }

    /// Quiescent analog level: 0 V, or the nearest bound when 0 V is outside the range.
    pub fn quiescent(&self) -> f64 {
        0.0_f64.clamp(self.min, self.max)
    }

    fn check(&self, channel: &str, volts: f64) -> BenchResult<()> {
        if self.contains(volts) {
            Ok(())
        } else {
            Err(BenchError::OutputRange {
                channel: channel.to_string(),
                value: volts,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl Default for OutputRange {
    fn default() -> Self {
        Self { min: 0.0, max: 5.0 }
    }
}

/// Which line state counts as asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Idles low, asserted high (clock)
    ActiveHigh,
    /// Idles high, asserted low (asynchronous clear)
    ActiveLow,
}

impl Polarity {
    pub fn idle_level(self) -> bool {
        matches!(self, Polarity::ActiveLow)
    }

    pub fn active_level(self) -> bool {
        !self.idle_level()
    }
}

/// One idle → active → idle excursion of a digital line.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseSpec {
    pub line: String,
    /// Time spent active
    pub width: Duration,
    pub polarity: Polarity,
    /// Idle time before activation
    pub lead: Duration,
    /// Wait after returning to idle
    pub trail: Duration,
}

impl PulseSpec {
    /// A pulse with no lead or trail time.
    pub fn new(line: impl Into<String>, width: Duration, polarity: Polarity) -> Self {
        Self {
            line: line.into(),
            width,
            polarity,
            lead: Duration::ZERO,
            trail: Duration::ZERO,
        }
    }

    pub fn with_lead(mut self, lead: Duration) -> Self {
        self.lead = lead;
        self
    }

    pub fn with_trail(mut self, trail: Duration) -> Self {
        self.trail = trail;
        self
    }
}

pub(crate) fn wait(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

/// The active phase of a pulse.
///
/// Holds exclusive access to the digital output; dropping it drives the line back to
/// idle. Call [`release`](Self::release) to do so explicitly and observe the error.
pub struct ActivePhase<'a> {
    digital: &'a mut dyn DigitalOutput,
    line: &'a str,
    idle: bool,
    released: bool,
}

impl<'a> ActivePhase<'a> {
    fn begin(digital: &'a mut dyn DigitalOutput, spec: &'a PulseSpec) -> BenchResult<Self> {
        let idle = spec.polarity.idle_level();
        let mut phase = Self {
            digital,
            line: &spec.line,
            idle,
            released: false,
        };
        // Constructed first so a half-applied activation still returns to idle.
        phase.digital.set_line(phase.line, !idle)?;
        trace!(line = phase.line, "Pulse active");
        Ok(phase)
    }

    /// Return the line to idle now.
    pub fn release(mut self) -> BenchResult<()> {
        self.released = true;
        self.digital.set_line(self.line, self.idle)
    }
}

impl Drop for ActivePhase<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.digital.set_line(self.line, self.idle) {
            warn!(line = self.line, error = %e, "Failed to return line to idle");
        }
    }
}

/// Owner of the DAQ outputs wired to the DUT.
pub struct StimulusController {
    analog: Box<dyn AnalogOutput>,
    digital: Box<dyn DigitalOutput>,
    range: OutputRange,
}

impl StimulusController {
    pub fn new(
        analog: Box<dyn AnalogOutput>,
        digital: Box<dyn DigitalOutput>,
        range: OutputRange,
    ) -> Self {
        Self {
            analog,
            digital,
            range,
        }
    }

    pub fn output_range(&self) -> OutputRange {
        self.range
    }

    /// Drive `output_id` to `level`: analog channel for `Volts`, digital line for `Logic`.
    pub fn set_level(&mut self, output_id: &str, level: Level) -> BenchResult<()> {
        match level {
            Level::Volts(v) => self.set_voltage(output_id, v),
            Level::Logic(high) => self.set_line(output_id, high),
        }
    }

    /// Range-checked analog write.
    pub fn set_voltage(&mut self, channel: &str, volts: f64) -> BenchResult<()> {
        self.range.check(channel, volts)?;
        trace!(channel, volts, "Analog output");
        self.analog.set_voltage(channel, volts)
    }

    pub fn set_line(&mut self, line: &str, high: bool) -> BenchResult<()> {
        trace!(line, high, "Digital output");
        self.digital.set_line(line, high)
    }

    /// Idle, wait `lead`, activate for `width`, idle, wait `trail`.
    pub fn pulse(&mut self, spec: &PulseSpec) -> BenchResult<()> {
        self.pulse_while(spec, |active| {
            wait(active);
            Ok(())
        })
    }

    /// Like [`pulse`](Self::pulse), but runs `during` inside the active phase.
    ///
    /// `during` receives the configured width. The line returns to idle whether
    /// `during` succeeds, fails or panics.
    pub fn pulse_while<T, F>(&mut self, spec: &PulseSpec, during: F) -> BenchResult<T>
    where
        F: FnOnce(Duration) -> BenchResult<T>,
    {
        self.set_line(&spec.line, spec.polarity.idle_level())?;
        wait(spec.lead);

        let phase = ActivePhase::begin(self.digital.as_mut(), spec)?;
        let value = during(spec.width)?;
        phase.release()?;

        wait(spec.trail);
        Ok(value)
    }

    /// Drive every listed output to its quiescent level.
    ///
    /// `lines` pairs each digital line with its idle state. All outputs are attempted;
    /// the first failure is returned.
    pub fn quiesce(&mut self, channels: &[&str], lines: &[(&str, bool)]) -> BenchResult<()> {
        let zero = self.range.quiescent();
        let mut first_error = None;

        for channel in channels {
            if let Err(e) = self.analog.set_voltage(channel, zero) {
                warn!(channel, error = %e, "Quiesce failed");
                first_error.get_or_insert(e);
            }
        }
        for (line, idle) in lines {
            if let Err(e) = self.digital.set_line(line, *idle) {
                warn!(line, error = %e, "Quiesce failed");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{BenchEvent, SimulatedFixture};

    fn controller(fixture: &SimulatedFixture) -> StimulusController {
        StimulusController::new(
            Box::new(fixture.analog_output()),
            Box::new(fixture.digital_output()),
            OutputRange::new(0.0, 5.0),
        )
    }

    #[test]
    fn rejects_out_of_range_before_writing() {
        let fixture = SimulatedFixture::new();
        let mut stim = controller(&fixture);
        let err = stim.set_voltage("Dev1/ao0", 5.5).unwrap_err();
        assert!(matches!(err, BenchError::OutputRange { .. }));
        let err = stim.set_level("Dev1/ao0", Level::Volts(f64::NAN)).unwrap_err();
        assert!(matches!(err, BenchError::OutputRange { .. }));
        assert!(fixture.events().is_empty());
    }

    #[test]
    fn active_high_pulse_sequence() {
        let fixture = SimulatedFixture::new();
        let mut stim = controller(&fixture);
        stim.pulse(&PulseSpec::new("clk", Duration::ZERO, Polarity::ActiveHigh))
            .unwrap();
        assert_eq!(
            fixture.events(),
            vec![
                BenchEvent::Line("clk".into(), false),
                BenchEvent::Line("clk".into(), true),
                BenchEvent::Line("clk".into(), false),
            ]
        );
    }

    #[test]
    fn active_low_pulse_idles_high() {
        let fixture = SimulatedFixture::new();
        let mut stim = controller(&fixture);
        stim.pulse(&PulseSpec::new("clr", Duration::ZERO, Polarity::ActiveLow))
            .unwrap();
        assert_eq!(
            fixture.events(),
            vec![
                BenchEvent::Line("clr".into(), true),
                BenchEvent::Line("clr".into(), false),
                BenchEvent::Line("clr".into(), true),
            ]
        );
    }

    #[test]
    fn failing_active_phase_still_restores_idle() {
        let fixture = SimulatedFixture::new();
        let mut stim = controller(&fixture);
        let spec = PulseSpec::new("clk", Duration::ZERO, Polarity::ActiveHigh);
        let result: BenchResult<()> =
            stim.pulse_while(&spec, |_| Err(BenchError::communication("scope", "lost")));
        assert!(result.is_err());
        assert_eq!(fixture.line("clk"), Some(false));
        assert_eq!(
            fixture.events().last(),
            Some(&BenchEvent::Line("clk".into(), false))
        );
    }

    #[test]
    fn quiesce_attempts_everything() {
        let fixture = SimulatedFixture::new();
        let mut stim = controller(&fixture);
        stim.set_voltage("Dev1/ao0", 5.0).unwrap();
        stim.set_voltage("Dev1/ao1", 5.0).unwrap();
        fixture.fail_analog_writes(true);

        let err = stim
            .quiesce(&["Dev1/ao0", "Dev1/ao1"], &[("clk", false)])
            .unwrap_err();
        assert!(err.is_fatal());
        // digital side still reached
        assert_eq!(fixture.line("clk"), Some(false));

        fixture.fail_analog_writes(false);
        stim.quiesce(&["Dev1/ao0", "Dev1/ao1"], &[]).unwrap();
        assert_eq!(fixture.voltage("Dev1/ao0"), Some(0.0));
        assert_eq!(fixture.voltage("Dev1/ao1"), Some(0.0));
    }

    #[test]
    fn polarity_levels() {
        assert!(!Polarity::ActiveHigh.idle_level());
        assert!(Polarity::ActiveLow.idle_level());
        assert!(!Polarity::ActiveLow.active_level());
    }
}
