//! Bench session: the context every characterization runs in.
//!
//! A [`Bench`] owns the stimulus controller, the optional measurement instruments and
//! the configuration. Operations borrow it mutably, so two procedures can never drive
//! the fixture at once.
//!
//! ## Lifecycle
//!
//! - **`open`**: outputs to quiescent levels, multimeter configured, supply power-cycled,
//!   function generator programmed; on failure everything is shut down again
//! - **operations**: `sweep`, `hysteresis`, `function_table`, `supply_currents`,
//!   `propagation_delay`, `setup_time`
//! - **`close`**: outputs quiesced, generator output and supply switched off; every
//!   step is attempted
//!
//! ## Wiring
//!
//! - [`Bench::simulated`] connects everything to a [`SimulatedFixture`]
//! - [`Bench::connect`] opens the serial instruments named in the configuration
//!   around a caller-supplied stimulus controller

use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{BenchConfig, FunctionGeneratorConfig, PowerSupplyConfig, SweptInput};
use crate::error::{BenchError, BenchResult};
use crate::hardware::capabilities::{InstrumentPort, WaveformCapture};
use crate::hardware::mock::SimulatedFixture;
use crate::instrument::{Afg2005, Fluke45, Spd3303, SquareWave};
use crate::measurement::{LastReply, ReadBounds, Reading, ValidatedReader};
use crate::procedures::{
    function_table::run_function_table, propagation::measure_propagation,
    setup_time::run_setup_time, supply_current::measure_current, CurrentMeasurement,
    CurrentProbe, DelayMeasurement, FunctionTable, FunctionTableRow, MuxSelector,
    SetupTimeResult,
};
use crate::stimulus::StimulusController;
use crate::sweep::{
    hysteresis, ChannelSetting, Hysteresis, SweepDirection, SweepEngine, SweepPlan, SweepResult,
};
use crate::waveform::DelayMode;

type Multimeter = Fluke45<Box<dyn InstrumentPort>>;
type PowerSupply = Spd3303<Box<dyn InstrumentPort>>;
type FunctionGenerator = Afg2005<Box<dyn InstrumentPort>>;

/// How the supply is brought up on `open`.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplySettings {
    pub channels: Vec<String>,
    pub volts: f64,
    pub current_limit: f64,
    pub off_time: Duration,
}

impl From<&PowerSupplyConfig> for SupplySettings {
    fn from(config: &PowerSupplyConfig) -> Self {
        Self {
            channels: config.channels.clone(),
            volts: config.supply_volts,
            current_limit: config.current_limit_amps,
            off_time: Duration::from_millis(config.off_time_ms),
        }
    }
}

/// How the function generator is programmed on `open`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorSettings {
    pub wave: SquareWave,
    pub output_on: bool,
}

impl From<&FunctionGeneratorConfig> for GeneratorSettings {
    fn from(config: &FunctionGeneratorConfig) -> Self {
        Self {
            wave: config.square,
            output_on: config.output_on_open,
        }
    }
}

/// Ascending and descending sweeps of the same input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HysteresisReport {
    pub ascending: SweepResult,
    pub descending: SweepResult,
    pub hysteresis: Option<Hysteresis>,
}

/// The fixture with its stimulus outputs and attached instruments.
///
/// Every procedure runs through a `Bench`; see the module docs for the lifecycle.
pub struct Bench {
    config: BenchConfig,
    stimulus: StimulusController,
    multimeter: Option<Multimeter>,
    scope: Option<Box<dyn WaveformCapture>>,
    supply: Option<(PowerSupply, SupplySettings)>,
    generator: Option<(FunctionGenerator, GeneratorSettings)>,
    reader: ValidatedReader,
    bounds: ReadBounds,
}

/// One validated reading through the multimeter.
fn read_output(
    multimeter: &mut Option<Multimeter>,
    reader: &ValidatedReader,
    bounds: &ReadBounds,
) -> Reading {
    match multimeter {
        Some(dmm) => reader.read_bounded(|| dmm.read_voltage(), bounds),
        None => Reading::Failed {
            last: LastReply::NoReply,
            attempts: 0,
        },
    }
}

impl Bench {
    /// A bench with stimulus only; attach instruments with the `with_*` methods.
    pub fn new(config: BenchConfig, stimulus: StimulusController) -> Self {
        let reader = ValidatedReader::new(config.timing.retry_delay());
        let bounds = ReadBounds::from(&config.reader);
        Self {
            config,
            stimulus,
            multimeter: None,
            scope: None,
            supply: None,
            generator: None,
            reader,
            bounds,
        }
    }

    /// Every capability wired to `fixture`. The supply is attached only when configured.
    pub fn simulated(config: BenchConfig, fixture: &SimulatedFixture) -> Self {
        let stimulus = StimulusController::new(
            Box::new(fixture.analog_output()),
            Box::new(fixture.digital_output()),
            config.fixture.output_range(),
        );
        let function_settle = config
            .instruments
            .multimeter
            .as_ref()
            .map_or(Duration::ZERO, |m| Duration::from_millis(m.function_settle_ms));
        let supply = config.instruments.power_supply.as_ref().map(SupplySettings::from);
        let generator = config
            .instruments
            .function_generator
            .as_ref()
            .map(GeneratorSettings::from);

        let mut bench = Self::new(config, stimulus)
            .with_multimeter(Box::new(fixture.multimeter()), function_settle)
            .with_scope(Box::new(fixture.scope()));
        if let Some(settings) = supply {
            bench = bench.with_power_supply(Box::new(fixture.power_supply()), settings);
        }
        if let Some(settings) = generator {
            bench = bench.with_function_generator(Box::new(fixture.function_generator()), settings);
        }
        bench
    }

    /// Open the serial instruments named in the configuration.
    #[cfg(feature = "instrument_serial")]
    pub fn connect(config: BenchConfig, stimulus: StimulusController) -> BenchResult<Self> {
        use crate::hardware::serial::SerialInstrument;
        use crate::instrument::TekScope;

        let dmm = config.instruments.multimeter.clone();
        let scope = config.instruments.oscilloscope.clone();
        let supply = config.instruments.power_supply.clone();
        let generator = config.instruments.function_generator.clone();
        let mut bench = Self::new(config, stimulus);

        if let Some(dmm) = dmm {
            let port = SerialInstrument::open("multimeter", &dmm.serial)?;
            bench = bench.with_multimeter(
                Box::new(port),
                Duration::from_millis(dmm.function_settle_ms),
            );
        }
        if let Some(scope) = scope {
            let port = SerialInstrument::open("oscilloscope", &scope.serial)?;
            let mut tek = TekScope::new(port, scope.record_length);
            tek.apply(&scope.setup)?;
            bench = bench.with_scope(Box::new(tek));
        }
        if let Some(supply) = supply {
            let port = SerialInstrument::open("power_supply", &supply.serial)?;
            bench = bench.with_power_supply(Box::new(port), SupplySettings::from(&supply));
        }
        if let Some(generator) = generator {
            let port = SerialInstrument::open("function_generator", &generator.serial)?;
            bench = bench
                .with_function_generator(Box::new(port), GeneratorSettings::from(&generator));
        }
        Ok(bench)
    }

    /// Without serial support only an instrument-free configuration can be connected.
    #[cfg(not(feature = "instrument_serial"))]
    pub fn connect(config: BenchConfig, stimulus: StimulusController) -> BenchResult<Self> {
        let instruments = &config.instruments;
        if instruments.multimeter.is_some()
            || instruments.oscilloscope.is_some()
            || instruments.power_supply.is_some()
            || instruments.function_generator.is_some()
        {
            return Err(BenchError::FeatureNotEnabled("instrument_serial".to_string()));
        }
        Ok(Self::new(config, stimulus))
    }

    pub fn with_multimeter(mut self, port: Box<dyn InstrumentPort>, function_settle: Duration) -> Self {
        self.multimeter = Some(Fluke45::new(port, function_settle));
        self
    }

    pub fn with_scope(mut self, scope: Box<dyn WaveformCapture>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_power_supply(mut self, port: Box<dyn InstrumentPort>, settings: SupplySettings) -> Self {
        self.supply = Some((Spd3303::new(port), settings));
        self
    }

    pub fn with_function_generator(
        mut self,
        port: Box<dyn InstrumentPort>,
        settings: GeneratorSettings,
    ) -> Self {
        self.generator = Some((Afg2005::new(port), settings));
        self
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn stimulus_mut(&mut self) -> &mut StimulusController {
        &mut self.stimulus
    }

    fn quiesce(&mut self) -> BenchResult<()> {
        let fixture = &self.config.fixture;
        let mut lines = vec![
            (fixture.clock.line.as_str(), fixture.clock.polarity.idle_level()),
            (fixture.clear.line.as_str(), fixture.clear.polarity.idle_level()),
        ];
        lines.extend(fixture.mux_lines.iter().map(|l| (l.as_str(), false)));
        self.stimulus.quiesce(
            &[fixture.j_channel.as_str(), fixture.k_channel.as_str()],
            &lines,
        )
    }

    /// Bring the fixture to a known state.
    ///
    /// A failure part way through runs [`close`](Self::close) before the error is
    /// returned, so a half-powered supply is never left on.
    pub fn open(&mut self) -> BenchResult<()> {
        if let Err(e) = self.bring_up() {
            warn!(error = %e, "Bench open failed, shutting down");
            if let Err(close_error) = self.close() {
                warn!(error = %close_error, "Shutdown after failed open incomplete");
            }
            return Err(e);
        }
        info!(
            multimeter = self.multimeter.is_some(),
            scope = self.scope.is_some(),
            supply = self.supply.is_some(),
            generator = self.generator.is_some(),
            "Bench open"
        );
        Ok(())
    }

    fn bring_up(&mut self) -> BenchResult<()> {
        self.quiesce()?;
        if let Some(dmm) = self.multimeter.as_mut() {
            dmm.configure()?;
        }
        if let Some((supply, settings)) = self.supply.as_mut() {
            supply.power_cycle(
                &settings.channels,
                settings.volts,
                settings.current_limit,
                settings.off_time,
            )?;
        }
        if let Some((generator, settings)) = self.generator.as_mut() {
            let idn = generator.identify()?;
            info!(instrument = %idn, "Function generator found");
            generator.apply_square(&settings.wave)?;
            generator.set_output(settings.output_on)?;
        }
        Ok(())
    }

    /// Quiesce outputs and power down. Every step runs; the first error is returned.
    pub fn close(&mut self) -> BenchResult<()> {
        let mut first_error = self.quiesce().err();
        if let Some((generator, _)) = self.generator.as_mut() {
            if let Err(e) = generator.set_output(false) {
                warn!(error = %e, "Generator output off failed");
                first_error.get_or_insert(e);
            }
        }
        if let Some((supply, settings)) = self.supply.as_mut() {
            for channel in &settings.channels {
                if let Err(e) = supply.shutdown(channel) {
                    warn!(channel = %channel, error = %e, "Supply shutdown failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        info!("Bench closed");
        first_error.map_or(Ok(()), Err)
    }

    /// Validated reading of the multimeter.
    ///
    /// Without a multimeter this is an immediate `Failed` with no attempts.
    pub fn measure_output(&mut self) -> Reading {
        read_output(&mut self.multimeter, &self.reader, &self.bounds)
    }

    fn require_multimeter(&self) -> BenchResult<()> {
        if self.multimeter.is_none() {
            return Err(BenchError::Configuration("no multimeter attached".to_string()));
        }
        Ok(())
    }

    /// The configured sweep, traversed in `direction`.
    pub fn sweep_plan(&self, direction: SweepDirection) -> SweepPlan {
        let fixture = &self.config.fixture;
        let sweep = &self.config.sweep;
        let (swept, held) = match sweep.swept_input {
            SweptInput::J => (&fixture.j_channel, &fixture.k_channel),
            SweptInput::K => (&fixture.k_channel, &fixture.j_channel),
        };
        let preload = sweep
            .preload
            .map(|p| {
                vec![
                    ChannelSetting::new(fixture.j_channel.clone(), p.j),
                    ChannelSetting::new(fixture.k_channel.clone(), p.k),
                ]
            })
            .unwrap_or_default();

        SweepPlan {
            swept_channel: swept.clone(),
            values: sweep.range().values(direction),
            fixed_inputs: vec![ChannelSetting::new(held.clone(), sweep.hold_volts)],
            settle: self.config.timing.settle(),
            latch_delay: self.config.timing.latch_delay(),
            logic_threshold: sweep.logic_threshold,
            clock: fixture.clock.to_spec(),
            reset: Some(fixture.clear.to_spec()),
            reset_each_point: sweep.reset_each_point,
            preload,
        }
    }

    /// Run `plan` with the multimeter as the measurement.
    pub fn run_plan(&mut self, plan: &SweepPlan) -> BenchResult<SweepResult> {
        self.require_multimeter()?;
        let Self {
            stimulus,
            multimeter,
            reader,
            bounds,
            ..
        } = self;
        SweepEngine::new(stimulus).run_sweep(plan, || read_output(multimeter, reader, bounds))
    }

    /// The configured threshold sweep.
    pub fn sweep(&mut self) -> BenchResult<SweepResult> {
        let plan = self.sweep_plan(self.config.sweep.direction);
        self.run_plan(&plan)
    }

    /// Ascending then descending sweep, each point started from a cleared Q.
    pub fn hysteresis(&mut self) -> BenchResult<HysteresisReport> {
        let mut up = self.sweep_plan(SweepDirection::Ascending);
        up.reset_each_point = true;
        up.preload.clear();
        let mut down = up.clone();
        down.values.reverse();

        let ascending = self.run_plan(&up)?;
        let descending = self.run_plan(&down)?;
        let hysteresis = hysteresis(&ascending, &descending);
        info!(?hysteresis, "Hysteresis measured");
        Ok(HysteresisReport {
            ascending,
            descending,
            hysteresis,
        })
    }

    pub fn function_table(&mut self) -> BenchResult<FunctionTable> {
        self.require_multimeter()?;
        let rows = FunctionTableRow::standard(self.config.fixture.logic_high_volts);
        let Self {
            config,
            stimulus,
            multimeter,
            reader,
            bounds,
            ..
        } = self;
        run_function_table(
            stimulus,
            &config.fixture,
            &config.timing,
            config.sweep.logic_threshold,
            &rows,
            || read_output(multimeter, reader, bounds),
        )
    }

    /// ICC then IIL.
    pub fn supply_currents(&mut self) -> BenchResult<Vec<CurrentMeasurement>> {
        self.require_multimeter()?;
        let mux = MuxSelector::from_fixture(&self.config.fixture).ok_or_else(|| {
            BenchError::Configuration("fixture.mux_lines must name 3 lines".to_string())
        })?;
        let Self {
            config,
            stimulus,
            multimeter,
            reader,
            bounds,
            ..
        } = self;
        let probes = [
            CurrentProbe::icc(&config.fixture, &config.current),
            CurrentProbe::iil(&config.fixture, &config.current),
        ];
        probes
            .iter()
            .map(|probe| {
                measure_current(
                    stimulus,
                    &config.fixture,
                    &mux,
                    &config.current,
                    probe,
                    || read_output(multimeter, reader, bounds),
                )
            })
            .collect()
    }

    pub fn propagation_delay(&mut self, mode: DelayMode) -> BenchResult<DelayMeasurement> {
        let Self {
            config,
            stimulus,
            scope,
            ..
        } = self;
        let scope = scope
            .as_deref_mut()
            .ok_or_else(|| BenchError::Configuration("no oscilloscope attached".to_string()))?;
        measure_propagation(stimulus, scope, &config.fixture, &config.timing, mode)
    }

    pub fn setup_time(&mut self) -> BenchResult<SetupTimeResult> {
        let Self {
            config,
            stimulus,
            scope,
            ..
        } = self;
        let scope = scope
            .as_deref_mut()
            .ok_or_else(|| BenchError::Configuration("no oscilloscope attached".to_string()))?;
        run_setup_time(
            stimulus,
            scope,
            &config.fixture,
            &config.setup_time,
            config.sweep.logic_threshold,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stimulus::OutputRange;

    #[test]
    fn plan_follows_swept_input() {
        let fixture = SimulatedFixture::new();
        let mut config = BenchConfig::default();
        config.sweep.swept_input = SweptInput::K;
        let bench = Bench::simulated(config, &fixture);
        let plan = bench.sweep_plan(SweepDirection::Descending);
        assert_eq!(plan.swept_channel, "Dev1/ao1");
        assert_eq!(plan.fixed_inputs[0].channel, "Dev1/ao0");
        assert_eq!(plan.values.first(), Some(&1.5));
        assert_eq!(plan.preload.len(), 2);
    }

    #[test]
    fn missing_instruments_are_configuration_errors() {
        let fixture = SimulatedFixture::new();
        let stimulus = StimulusController::new(
            Box::new(fixture.analog_output()),
            Box::new(fixture.digital_output()),
            OutputRange::default(),
        );
        let mut bench = Bench::new(BenchConfig::default(), stimulus);
        assert!(matches!(bench.sweep(), Err(BenchError::Configuration(_))));
        assert!(matches!(
            bench.propagation_delay(DelayMode::HighToLow),
            Err(BenchError::Configuration(_))
        ));
        assert_eq!(bench.measure_output().attempts(), 0);
    }

    #[test]
    fn connect_without_instruments() {
        let fixture = SimulatedFixture::new();
        let stimulus = StimulusController::new(
            Box::new(fixture.analog_output()),
            Box::new(fixture.digital_output()),
            OutputRange::default(),
        );
        let bench = Bench::connect(BenchConfig::default(), stimulus).unwrap();
        assert!(bench.multimeter.is_none());
    }
}
