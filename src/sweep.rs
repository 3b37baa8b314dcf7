//! Voltage sweeps over one DUT input.
//!
//! A sweep steps one analog input through a list of values while the other inputs
//! are held fixed, clocks the device after each step and classifies the measured
//! output as a logic level. The result is the ordered list of points, from which the
//! switching threshold (and, with two opposite sweeps, the input hysteresis) follows.
//!
//! # Sequencing
//!
//! 1. `reset` pulse and `preload` clock, when configured
//! 2. per value: optional per-point reset, set swept input, set fixed inputs, wait
//!    `settle`, pulse the clock, wait `latch_delay`, measure, classify, append
//! 3. teardown: every touched output back to its quiescent level
//!
//! A measurement that fails validation becomes an [`LogicLevel::Indeterminate`] point and
//! the sweep continues. An output command that fails ends the sweep with
//! [`BenchError::SweepAborted`]. Teardown runs in both cases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

use crate::error::{BenchError, BenchResult};
use crate::measurement::Reading;
use crate::stimulus::{wait, PulseSpec, StimulusController};

/// Order in which a range is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepDirection {
    Ascending,
    Descending,
}

impl SweepDirection {
    pub fn reversed(self) -> Self {
        match self {
            SweepDirection::Ascending => SweepDirection::Descending,
            SweepDirection::Descending => SweepDirection::Ascending,
        }
    }
}

/// Largest number of points a single sweep may have.
pub const MAX_SWEEP_POINTS: usize = 100_000;

/// Inclusive `[start, stop]` range with a fixed step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl SweepRange {
    /// Number of values, or `None` when the range is malformed or would exceed
    /// [`MAX_SWEEP_POINTS`].
    pub fn point_count(&self) -> Option<usize> {
        if !(self.step > 0.0) || !(self.stop >= self.start) {
            return None;
        }
        // tolerance absorbs representation error in (stop - start) / step
        let intervals = ((self.stop - self.start) / self.step + 1e-9).floor();
        if !intervals.is_finite() || intervals >= MAX_SWEEP_POINTS as f64 {
            return None;
        }
        (intervals as usize).checked_add(1)
    }

    /// Number of values; zero for an empty, malformed or oversized range.
    pub fn len(&self) -> usize {
        self.point_count().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values in traversal order, each computed from its index.
    pub fn values(&self, direction: SweepDirection) -> Vec<f64> {
        let n = self.len();
        (0..n)
            .map(|i| {
                let offset = i as f64 * self.step;
                let v = match direction {
                    SweepDirection::Ascending => self.start + offset,
                    SweepDirection::Descending => self.stop - offset,
                };
                v.clamp(self.start, self.stop)
            })
            .collect()
    }
}

/// An analog input held at a fixed voltage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSetting {
    pub channel: String,
    pub volts: f64,
}

impl ChannelSetting {
    pub fn new(channel: impl Into<String>, volts: f64) -> Self {
        Self {
            channel: channel.into(),
            volts,
        }
    }
}

/// Everything a sweep needs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub swept_channel: String,
    /// Applied in this order, never reordered
    pub values: Vec<f64>,
    pub fixed_inputs: Vec<ChannelSetting>,
    pub settle: Duration,
    pub latch_delay: Duration,
    pub logic_threshold: f64,
    pub clock: PulseSpec,
    /// Asynchronous clear, pulsed before the first point
    pub reset: Option<PulseSpec>,
    /// Also pulse `reset` before every point
    pub reset_each_point: bool,
    /// Inputs clocked in once after the reset; empty for none
    pub preload: Vec<ChannelSetting>,
}

/// Classified output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicLevel {
    High,
    Low,
    Indeterminate,
}

impl LogicLevel {
    /// `High` at or above `threshold`, `Low` below it, `Indeterminate` without a valid reading.
    pub fn classify(reading: &Reading, threshold: f64) -> Self {
        match reading.value() {
            Some(v) if v >= threshold => LogicLevel::High,
            Some(_) => LogicLevel::Low,
            None => LogicLevel::Indeterminate,
        }
    }

    pub fn is_determinate(self) -> bool {
        self != LogicLevel::Indeterminate
    }
}

impl fmt::Display for LogicLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicLevel::High => "H",
            LogicLevel::Low => "L",
            LogicLevel::Indeterminate => "?",
        })
    }
}

/// One applied stimulus value and what was measured for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPoint {
    pub stimulus: f64,
    pub held: Vec<ChannelSetting>,
    pub reading: Reading,
    pub label: LogicLevel,
}

/// Flat table row: stimulus, measured output, label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepRow {
    pub stimulus: f64,
    pub measured: Option<f64>,
    pub label: LogicLevel,
}

/// First change of determinate label along a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub from: LogicLevel,
    pub to: LogicLevel,
    /// Stimulus of the last point carrying `from`
    pub before: f64,
    /// Stimulus of the first point carrying `to`
    pub after: f64,
}

/// Points of one sweep in application order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepResult {
    pub swept_channel: String,
    pub logic_threshold: f64,
    /// `None` for fewer than two points
    pub direction: Option<SweepDirection>,
    points: Vec<SweepPoint>,
}

impl SweepResult {
    fn new(plan: &SweepPlan) -> Self {
        let direction = match plan.values.as_slice() {
            [first, .., last] if last > first => Some(SweepDirection::Ascending),
            [first, .., last] if last < first => Some(SweepDirection::Descending),
            _ => None,
        };
        Self {
            swept_channel: plan.swept_channel.clone(),
            logic_threshold: plan.logic_threshold,
            direction,
            points: Vec::with_capacity(plan.values.len()),
        }
    }

    pub fn points(&self) -> &[SweepPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn labels(&self) -> Vec<LogicLevel> {
        self.points.iter().map(|p| p.label).collect()
    }

    pub fn rows(&self) -> Vec<SweepRow> {
        self.points
            .iter()
            .map(|p| SweepRow {
                stimulus: p.stimulus,
                measured: p.reading.value(),
                label: p.label,
            })
            .collect()
    }

    /// First label change between determinate points, in application order.
    pub fn first_transition(&self) -> Option<Transition> {
        let mut determinate = self.points.iter().filter(|p| p.label.is_determinate());
        let mut previous = determinate.next()?;
        for point in determinate {
            if point.label != previous.label {
                return Some(Transition {
                    from: previous.label,
                    to: point.label,
                    before: previous.stimulus,
                    after: point.stimulus,
                });
            }
            previous = point;
        }
        None
    }
}

impl fmt::Display for SweepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>10}  {:>10}  {}", self.swept_channel, "Q (V)", "Q")?;
        for row in self.rows() {
            match row.measured {
                Some(v) => writeln!(f, "{:>10.3}  {:>10.4}  {}", row.stimulus, v, row.label)?,
                None => writeln!(f, "{:>10.3}  {:>10}  {}", row.stimulus, "-", row.label)?,
            }
        }
        Ok(())
    }
}

/// Switching thresholds from a pair of opposite sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hysteresis {
    /// Input level at which the output first changed while rising
    pub rising: f64,
    /// Input level at which the output first changed while falling
    pub falling: f64,
    /// `rising - falling`
    pub width: f64,
}

/// Hysteresis from an ascending and a descending sweep over the same input.
///
/// `None` when either sweep has no transition.
pub fn hysteresis(ascending: &SweepResult, descending: &SweepResult) -> Option<Hysteresis> {
    let rising = ascending.first_transition()?.after;
    let falling = descending.first_transition()?.after;
    Some(Hysteresis {
        rising,
        falling,
        width: rising - falling,
    })
}

/// Runs sweep plans against a borrowed stimulus controller.
///
/// The mutable borrow means one controller drives at most one sweep at a time.
pub struct SweepEngine<'a> {
    stimulus: &'a mut StimulusController,
}

impl<'a> SweepEngine<'a> {
    pub fn new(stimulus: &'a mut StimulusController) -> Self {
        Self { stimulus }
    }

    /// Execute `plan`, calling `measure` once per point after the latch delay.
    pub fn run_sweep<F>(&mut self, plan: &SweepPlan, mut measure: F) -> BenchResult<SweepResult>
    where
        F: FnMut() -> Reading,
    {
        let span = info_span!("sweep", channel = %plan.swept_channel, points = plan.values.len());
        let _enter = span.enter();

        let mut result = SweepResult::new(plan);
        let outcome = self.execute(plan, &mut measure, &mut result);
        let teardown = self.teardown(plan);

        match outcome {
            Err(source) => {
                warn!(completed = result.len(), error = %source, "Sweep aborted");
                Err(BenchError::SweepAborted {
                    completed: result.len(),
                    source: Box::new(source),
                })
            }
            Ok(()) => {
                // the points were measured; a failed teardown does not void them
                if let Err(e) = teardown {
                    warn!(points = result.len(), error = %e, "Sweep teardown failed");
                }
                info!(
                    points = result.len(),
                    transition = ?result.first_transition(),
                    "Sweep complete"
                );
                Ok(result)
            }
        }
    }

    fn execute<F>(
        &mut self,
        plan: &SweepPlan,
        measure: &mut F,
        result: &mut SweepResult,
    ) -> BenchResult<()>
    where
        F: FnMut() -> Reading,
    {
        if let Some(reset) = &plan.reset {
            self.stimulus.pulse(reset)?;
        }
        if !plan.preload.is_empty() {
            self.apply(&plan.preload)?;
            wait(plan.settle);
            self.stimulus.pulse(&plan.clock)?;
        }

        for &value in &plan.values {
            if plan.reset_each_point {
                if let Some(reset) = &plan.reset {
                    self.stimulus.pulse(reset)?;
                }
            }
            self.stimulus.set_voltage(&plan.swept_channel, value)?;
            self.apply(&plan.fixed_inputs)?;
            wait(plan.settle);
            self.stimulus.pulse(&plan.clock)?;
            wait(plan.latch_delay);

            let reading = measure();
            let label = LogicLevel::classify(&reading, plan.logic_threshold);
            debug!(stimulus = value, %reading, %label, "Sweep point");
            result.points.push(SweepPoint {
                stimulus: value,
                held: plan.fixed_inputs.clone(),
                reading,
                label,
            });
        }
        Ok(())
    }

    fn apply(&mut self, settings: &[ChannelSetting]) -> BenchResult<()> {
        for setting in settings {
            self.stimulus.set_voltage(&setting.channel, setting.volts)?;
        }
        Ok(())
    }

    fn teardown(&mut self, plan: &SweepPlan) -> BenchResult<()> {
        let mut channels: Vec<&str> = vec![plan.swept_channel.as_str()];
        for setting in plan.fixed_inputs.iter().chain(&plan.preload) {
            if !channels.contains(&setting.channel.as_str()) {
                channels.push(&setting.channel);
            }
        }
        let mut lines = vec![(plan.clock.line.as_str(), plan.clock.polarity.idle_level())];
        if let Some(reset) = &plan.reset {
            lines.push((reset.line.as_str(), reset.polarity.idle_level()));
        }
        self.stimulus.quiesce(&channels, &lines)
    }
}
