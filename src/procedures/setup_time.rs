//! Setup-time pass/fail test.
//!
//! For each candidate setup time `t`, J rises `t` before the clock sequence starts with
//! K held low and Q cleared. If Q was set, the candidate passes.

use serde::Serialize;
use std::time::Duration;
use tracing::{info, info_span, warn};

use super::{set_inputs, with_teardown};
use crate::config::{FixtureConfig, SetupTimeConfig};
use crate::error::BenchResult;
use crate::hardware::capabilities::WaveformCapture;
use crate::stimulus::{wait, StimulusController};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupTimeTrial {
    pub setup_time: Duration,
    /// Highest Q voltage seen; `None` when the capture failed
    pub peak: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupTimeResult {
    pub logic_threshold: f64,
    /// In the order the candidates were tested
    pub trials: Vec<SetupTimeTrial>,
}

impl SetupTimeResult {
    /// Shortest candidate that passed.
    pub fn minimum_passing(&self) -> Option<Duration> {
        self.trials
            .iter()
            .filter(|t| t.passed)
            .map(|t| t.setup_time)
            .min()
    }
}

pub fn run_setup_time(
    stimulus: &mut StimulusController,
    scope: &mut dyn WaveformCapture,
    fixture: &FixtureConfig,
    config: &SetupTimeConfig,
    logic_threshold: f64,
) -> BenchResult<SetupTimeResult> {
    let span = info_span!("setup_time", candidates = config.candidates_ns.len());
    let _enter = span.enter();

    let clock = fixture.clock.to_spec();
    let clear = fixture.clear.to_spec();
    let capture_delay = Duration::from_micros(config.capture_delay_us);

    with_teardown(stimulus, fixture, |stimulus| {
        let mut trials = Vec::with_capacity(config.candidates_ns.len());
        for &ns in &config.candidates_ns {
            let setup_time = Duration::from_nanos(ns);

            stimulus.pulse(&clear)?;
            set_inputs(stimulus, fixture, 0.0, 0.0)?;
            wait(setup_time);
            stimulus.set_voltage(&fixture.j_channel, fixture.logic_high_volts)?;
            wait(setup_time);
            stimulus.pulse(&clock)?;
            wait(capture_delay);

            let trial = match scope.capture(fixture.scope_output_channel) {
                Ok(waveform) => {
                    let peak = waveform.peak();
                    SetupTimeTrial {
                        setup_time,
                        peak,
                        passed: peak.is_some_and(|p| p >= logic_threshold),
                    }
                }
                Err(e) => {
                    warn!(setup_ns = ns, error = %e, "Capture failed, recording FAIL");
                    SetupTimeTrial {
                        setup_time,
                        peak: None,
                        passed: false,
                    }
                }
            };
            info!(setup_ns = ns, passed = trial.passed, "Setup-time trial");
            trials.push(trial);
        }
        Ok(SetupTimeResult {
            logic_threshold,
            trials,
        })
    })
}
