//! Characterization procedures for the flip-flop fixture.
//!
//! Each procedure is a fixed stimulus/measure sequence built on the same pieces as a
//! sweep: it drives the DUT through a [`StimulusController`], measures through a
//! caller-supplied function or a [`WaveformCapture`](crate::hardware::WaveformCapture),
//! and always returns the outputs it touched to their quiescent level.
//!
//! ```text
//! ┌────────────────┬──────────────────────────────┬──────────────────────┐
//! │ Procedure      │ Stimulus                     │ Measurement          │
//! ├────────────────┼──────────────────────────────┼──────────────────────┤
//! │ function_table │ CLR/J/K rows, one clock each │ validated Q reading  │
//! │ supply_current │ preset inputs, mux steps     │ shunt voltage pair   │
//! │ propagation    │ preset Q, opposite clock     │ clock + Q waveforms  │
//! │ setup_time     │ J edge, delay, clock         │ Q waveform peak      │
//! └────────────────┴──────────────────────────────┴──────────────────────┘
//! ```

pub mod function_table;
pub mod propagation;
pub mod setup_time;
pub mod supply_current;

pub use function_table::{FunctionTable, FunctionTableEntry, FunctionTableRow};
pub use propagation::DelayMeasurement;
pub use setup_time::{SetupTimeResult, SetupTimeTrial};
pub use supply_current::{CurrentMeasurement, CurrentProbe, MuxSelector};

use tracing::warn;

use crate::config::FixtureConfig;
use crate::error::BenchResult;
use crate::stimulus::StimulusController;

/// Drive J and K.
pub(crate) fn set_inputs(
    stimulus: &mut StimulusController,
    fixture: &FixtureConfig,
    j: f64,
    k: f64,
) -> BenchResult<()> {
    stimulus.set_voltage(&fixture.j_channel, j)?;
    stimulus.set_voltage(&fixture.k_channel, k)
}

/// Run `body`, then quiesce J, K, the clock, the clear line and the mux.
///
/// A body error wins over a teardown error; the teardown error is logged.
pub(crate) fn with_teardown<T, F>(
    stimulus: &mut StimulusController,
    fixture: &FixtureConfig,
    body: F,
) -> BenchResult<T>
where
    F: FnOnce(&mut StimulusController) -> BenchResult<T>,
{
    let outcome = body(stimulus);

    let mut lines = vec![
        (fixture.clock.line.as_str(), fixture.clock.polarity.idle_level()),
        (fixture.clear.line.as_str(), fixture.clear.polarity.idle_level()),
    ];
    lines.extend(fixture.mux_lines.iter().map(|l| (l.as_str(), false)));
    let teardown = stimulus.quiesce(
        &[fixture.j_channel.as_str(), fixture.k_channel.as_str()],
        &lines,
    );

    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown)) => {
            warn!(error = %teardown, "Teardown failed after procedure error");
            Err(e)
        }
    }
}
