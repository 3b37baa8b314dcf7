//! Captured traces and threshold-crossing analysis.
//!
//! A [`Waveform`] is one capture of one channel. Crossing detection scans samples
//! from the start of the trace and reports the timestamp of the first sample that
//! satisfies the threshold comparison. There is no interpolation between samples,
//! so the resolution of every result is the capture's sample interval.
//!
//! Thresholds default to the 50% amplitude point of the trace being analyzed,
//! `(max + min) / 2`, computed from that trace on every call.
//!
//! ```
//! use logic_bench::waveform::{find_crossing, EdgeDirection, Waveform};
//!
//! let wf = Waveform::new("CH2", vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![0.0, 0.0, 1.0, 1.0, 1.0])?;
//! assert_eq!(find_crossing(&wf, 0.5, EdgeDirection::Rising), Some(2.0));
//! # Ok::<(), logic_bench::BenchError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// One channel's (time, voltage) samples from a single capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waveform {
    channel: String,
    times: Vec<f64>,
    volts: Vec<f64>,
}

impl Waveform {
    /// Build a waveform, checking that the vectors pair up and time never runs backwards.
    pub fn new(channel: impl Into<String>, times: Vec<f64>, volts: Vec<f64>) -> BenchResult<Self> {
        let channel = channel.into();
        if times.len() != volts.len() {
            return Err(BenchError::InvalidWaveform(format!(
                "{channel}: {} timestamps but {} voltages",
                times.len(),
                volts.len()
            )));
        }
        if let Some(i) = times.windows(2).position(|w| !(w[1] >= w[0])) {
            return Err(BenchError::InvalidWaveform(format!(
                "{channel}: timestamp {} at sample {} precedes {}",
                times[i + 1],
                i + 1,
                times[i]
            )));
        }
        Ok(Self {
            channel,
            times,
            volts,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn volts(&self) -> &[f64] {
        &self.volts
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Iterate over `(time, voltage)` pairs.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.volts.iter().copied())
    }

    /// Highest voltage in the trace.
    pub fn peak(&self) -> Option<f64> {
        self.volts.iter().copied().reduce(f64::max)
    }

    /// Lowest voltage in the trace.
    pub fn trough(&self) -> Option<f64> {
        self.volts.iter().copied().reduce(f64::min)
    }

    /// 50% amplitude point: `(max + min) / 2`. `None` for an empty trace.
    pub fn midpoint_threshold(&self) -> Option<f64> {
        Some((self.peak()? + self.trough()?) / 2.0)
    }
}

/// Which comparison a crossing must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// First sample at or above the threshold
    Rising,
    /// First sample at or below the threshold
    Falling,
}

impl EdgeDirection {
    fn satisfied(self, volts: f64, threshold: f64) -> bool {
        match self {
            EdgeDirection::Rising => volts >= threshold,
            EdgeDirection::Falling => volts <= threshold,
        }
    }
}

/// Timestamp of the first sample satisfying `direction` against `threshold`.
///
/// Scans from sample 0; `None` when no sample qualifies.
pub fn find_crossing(waveform: &Waveform, threshold: f64, direction: EdgeDirection) -> Option<f64> {
    waveform
        .samples()
        .find(|&(_, v)| direction.satisfied(v, threshold))
        .map(|(t, _)| t)
}

/// The outcome of scanning one waveform for a crossing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossingEvent {
    pub channel: String,
    /// Threshold actually used; `None` only when the trace was empty and no midpoint exists
    pub threshold: Option<f64>,
    pub direction: EdgeDirection,
    /// Crossing timestamp, or `None` when not found
    pub time: Option<f64>,
}

/// Scan `waveform`, falling back to its own midpoint when `threshold` is not given.
pub fn crossing_event(
    waveform: &Waveform,
    threshold: Option<f64>,
    direction: EdgeDirection,
) -> CrossingEvent {
    let threshold = threshold.or_else(|| waveform.midpoint_threshold());
    let time = threshold.and_then(|level| find_crossing(waveform, level, direction));
    CrossingEvent {
        channel: waveform.channel().to_string(),
        threshold,
        direction,
        time,
    }
}

/// Edge pairing for a propagation-delay measurement.
///
/// The first direction applies to the reference channel (A), the second to the
/// output channel (B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayMode {
    /// tPHL: output falls; reference edge falls
    HighToLow,
    /// tPLH: output rises; the fixture's reference edge still falls
    LowToHigh,
    /// Any other pairing, stated explicitly
    Custom {
        reference: EdgeDirection,
        output: EdgeDirection,
    },
}

impl DelayMode {
    /// `(reference, output)` scan directions.
    pub fn directions(self) -> (EdgeDirection, EdgeDirection) {
        match self {
            DelayMode::HighToLow => (EdgeDirection::Falling, EdgeDirection::Falling),
            DelayMode::LowToHigh => (EdgeDirection::Falling, EdgeDirection::Rising),
            DelayMode::Custom { reference, output } => (reference, output),
        }
    }
}

/// Signed delay between two crossings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagationDelay {
    pub mode: DelayMode,
    pub reference: CrossingEvent,
    pub output: CrossingEvent,
    /// `t(output) - t(reference)` in seconds; negative when the output led.
    /// `None` when either crossing was not found.
    pub delay: Option<f64>,
}

impl PropagationDelay {
    pub fn is_defined(&self) -> bool {
        self.delay.is_some()
    }
}

/// Delay from the crossing in `reference` (A) to the crossing in `output` (B).
///
/// Each waveform is scanned against its own midpoint threshold.
pub fn propagation_delay(reference: &Waveform, output: &Waveform, mode: DelayMode) -> PropagationDelay {
    let (reference_dir, output_dir) = mode.directions();
    let reference = crossing_event(reference, None, reference_dir);
    let output = crossing_event(output, None, output_dir);
    let delay = match (reference.time, output.time) {
        (Some(a), Some(b)) => Some(b - a),
        _ => None,
    };
    PropagationDelay {
        mode,
        reference,
        output,
        delay,
    }
}
