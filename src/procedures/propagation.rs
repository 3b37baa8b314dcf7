//! Clock-to-Q propagation delay.
//!
//! Q is first preset to the opposite of the edge being measured, then the inputs are
//! switched so the next clock makes Q change. Both the clock and Q are captured from
//! that acquisition and handed to [`propagation_delay`].

use serde::Serialize;
use tracing::{info, info_span};

use super::{set_inputs, with_teardown};
use crate::config::{FixtureConfig, TimingConfig};
use crate::error::BenchResult;
use crate::hardware::capabilities::WaveformCapture;
use crate::stimulus::{wait, StimulusController};
use crate::waveform::{propagation_delay, DelayMode, EdgeDirection, PropagationDelay, Waveform};

/// A delay together with the traces it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayMeasurement {
    pub delay: PropagationDelay,
    pub reference: Waveform,
    pub output: Waveform,
}

/// Measure the delay for `mode`. The output edge direction decides the preset.
pub fn measure_propagation(
    stimulus: &mut StimulusController,
    scope: &mut dyn WaveformCapture,
    fixture: &FixtureConfig,
    timing: &TimingConfig,
    mode: DelayMode,
) -> BenchResult<DelayMeasurement> {
    let span = info_span!("propagation_delay", ?mode);
    let _enter = span.enter();

    let high = fixture.logic_high_volts;
    let (_, output_edge) = mode.directions();
    // (preset J/K, switching J/K)
    let (preset, switch) = match output_edge {
        EdgeDirection::Falling => ((high, 0.0), (0.0, high)),
        EdgeDirection::Rising => ((0.0, high), (high, 0.0)),
    };
    let clock = fixture.clock.to_spec();

    with_teardown(stimulus, fixture, |stimulus| {
        stimulus.set_line(&fixture.clear.line, fixture.clear.polarity.idle_level())?;
        set_inputs(stimulus, fixture, preset.0, preset.1)?;
        wait(timing.settle());
        stimulus.pulse(&clock)?;

        set_inputs(stimulus, fixture, switch.0, switch.1)?;
        wait(timing.settle());
        stimulus.pulse(&clock)?;

        let reference = scope.capture(fixture.scope_reference_channel)?;
        let output = scope.capture(fixture.scope_output_channel)?;
        let delay = propagation_delay(&reference, &output, mode);
        info!(delay = ?delay.delay, "Propagation delay measured");

        Ok(DelayMeasurement {
            delay,
            reference,
            output,
        })
    })
}
