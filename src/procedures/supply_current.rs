//! Supply current (ICC) and low-level input current (IIL).
//!
//! Both are measured as the voltage drop across a shunt: the multimeter is switched
//! by an analog multiplexer between a reference node and the loaded node, and
//! `I = (V_ref - V_loaded) / R_shunt`.

use serde::Serialize;
use std::time::Duration;
use tracing::{info, info_span};

use super::{set_inputs, with_teardown};
use crate::config::{CurrentConfig, FixtureConfig};
use crate::error::BenchResult;
use crate::measurement::Reading;
use crate::stimulus::{wait, StimulusController};

/// Three select lines of an 8-way analog mux.
#[derive(Debug, Clone)]
pub struct MuxSelector {
    /// C, B, A; A is the least significant bit
    lines: [String; 3],
}

impl MuxSelector {
    pub fn new(c: impl Into<String>, b: impl Into<String>, a: impl Into<String>) -> Self {
        Self {
            lines: [c.into(), b.into(), a.into()],
        }
    }

    /// From the fixture wiring; `None` unless exactly three lines are configured.
    pub fn from_fixture(fixture: &FixtureConfig) -> Option<Self> {
        match fixture.mux_lines.as_slice() {
            [c, b, a] => Some(Self::new(c.clone(), b.clone(), a.clone())),
            _ => None,
        }
    }

    /// Line levels for `channel` in C, B, A order.
    pub fn levels(channel: u8) -> [bool; 3] {
        [channel & 0b100 != 0, channel & 0b010 != 0, channel & 0b001 != 0]
    }

    /// Route mux input `channel` (0..=7) to the meter.
    pub fn select(&self, stimulus: &mut StimulusController, channel: u8) -> BenchResult<()> {
        for (line, high) in self.lines.iter().zip(Self::levels(channel)) {
            stimulus.set_line(line, high)?;
        }
        Ok(())
    }
}

/// One current measurement: input preset plus the two mux nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentProbe {
    pub name: String,
    pub j: f64,
    pub k: f64,
    pub reference_channel: u8,
    pub loaded_channel: u8,
    /// Hold time between arming the control lines and the reference reading
    pub arm: Duration,
}

impl CurrentProbe {
    /// Supply current with Q set (J high, K low).
    pub fn icc(fixture: &FixtureConfig, config: &CurrentConfig) -> Self {
        Self {
            name: "ICC".to_string(),
            j: fixture.logic_high_volts,
            k: 0.0,
            reference_channel: 0,
            loaded_channel: 3,
            arm: Duration::from_millis(config.icc_arm_ms),
        }
    }

    /// Low-level input current with Q reset (J low, K high).
    pub fn iil(fixture: &FixtureConfig, config: &CurrentConfig) -> Self {
        Self {
            name: "IIL".to_string(),
            j: 0.0,
            k: fixture.logic_high_volts,
            reference_channel: 2,
            loaded_channel: 1,
            arm: Duration::from_millis(config.iil_arm_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentMeasurement {
    pub name: String,
    pub reference: Reading,
    pub loaded: Reading,
    pub shunt_ohms: f64,
    /// Amperes; `None` when either reading failed
    pub current: Option<f64>,
}

impl CurrentMeasurement {
    fn new(name: String, reference: Reading, loaded: Reading, shunt_ohms: f64) -> Self {
        let current = match (reference.value(), loaded.value()) {
            (Some(v1), Some(v2)) => Some((v1 - v2) / shunt_ohms),
            _ => None,
        };
        Self {
            name,
            reference,
            loaded,
            shunt_ohms,
            current,
        }
    }
}

/// Preset the inputs, arm clear and clock, read both mux nodes.
pub fn measure_current<F>(
    stimulus: &mut StimulusController,
    fixture: &FixtureConfig,
    mux: &MuxSelector,
    config: &CurrentConfig,
    probe: &CurrentProbe,
    mut measure: F,
) -> BenchResult<CurrentMeasurement>
where
    F: FnMut() -> Reading,
{
    let span = info_span!("supply_current", probe = %probe.name);
    let _enter = span.enter();

    with_teardown(stimulus, fixture, |stimulus| {
        set_inputs(stimulus, fixture, probe.j, probe.k)?;
        mux.select(stimulus, probe.reference_channel)?;

        // clear released and clock high, then clock low: one falling edge
        stimulus.set_line(&fixture.clear.line, fixture.clear.polarity.idle_level())?;
        stimulus.set_line(&fixture.clock.line, true)?;
        stimulus.set_line(&fixture.clock.line, false)?;
        wait(probe.arm);
        let reference = measure();

        mux.select(stimulus, probe.loaded_channel)?;
        wait(Duration::from_millis(config.settle_ms));
        let loaded = measure();

        let result = CurrentMeasurement::new(probe.name.clone(), reference, loaded, config.shunt_ohms);
        info!(current = ?result.current, "Current measured");
        Ok(result)
    })
}
