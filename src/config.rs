//! Bench configuration using Figment
//!
//! Strongly-typed configuration for a characterization run. Values are layered:
//! 1. Built-in defaults (the fixture wiring and timing the bench was tuned with)
//! 2. A TOML file (`config/bench.toml` by default)
//! 3. Environment variables prefixed with `LOGIC_BENCH_`, nested with `__`
//!
//! Every delay the procedures use lives here as a `*_ms` value rather than a literal
//! buried in the sequencing code, so a fixture can be retuned without recompiling.
//!
//! # Example
//! ```no_run
//! use logic_bench::config::BenchConfig;
//!
//! let config = BenchConfig::load()?;
//! config.validate().map_err(logic_bench::BenchError::Configuration)?;
//! println!("Sweeping {:?} from {} V", config.sweep.swept_input, config.sweep.start_volts);
//! # Ok::<(), logic_bench::BenchError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::BenchResult;
use crate::instrument::function_generator::SquareWave;
use crate::instrument::oscilloscope::ScopeSetup;
use crate::stimulus::{OutputRange, Polarity, PulseSpec};
use crate::sweep::{SweepDirection, SweepRange, MAX_SWEEP_POINTS};
use crate::validation::{is_in_range, is_not_empty, is_ordered_bounds, is_valid_channel_name};

/// Top-level bench configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Delays shared by all procedures
    pub timing: TimingConfig,
    /// Validated-read bounds and retry limit
    pub reader: ReaderConfig,
    /// DAQ wiring of the flip-flop fixture
    pub fixture: FixtureConfig,
    /// Threshold sweep parameters
    pub sweep: SweepConfig,
    /// Supply/input current measurement parameters
    pub current: CurrentConfig,
    /// Setup-time test parameters
    pub setup_time: SetupTimeConfig,
    /// Serial instruments attached to the bench
    pub instruments: InstrumentsConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "JK flip-flop characterization".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Delays applied between sequencing steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Analog settling time after a stimulus change, before the clock pulse
    pub settle_ms: u64,
    /// Wait after the clock pulse before the output is measured
    pub latch_delay_ms: u64,
    /// Wait between validated-read attempts
    pub retry_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 200,
            latch_delay_ms: 1000,
            retry_delay_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn latch_delay(&self) -> Duration {
        Duration::from_millis(self.latch_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Acceptance window for multimeter readings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub min_volts: f64,
    pub max_volts: f64,
    pub max_attempts: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            min_volts: 0.0,
            max_volts: 6.0,
            max_attempts: 5,
        }
    }
}

/// One digital control line and how it is pulsed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    /// DAQ line name, e.g. `Dev1/port1/line1`
    pub line: String,
    /// Time spent in the active state
    pub width_ms: u64,
    /// Time held idle before activating
    #[serde(default)]
    pub lead_ms: u64,
    /// Time waited after returning to idle
    #[serde(default)]
    pub trail_ms: u64,
    pub polarity: Polarity,
}

impl PulseConfig {
    pub fn to_spec(&self) -> PulseSpec {
        PulseSpec {
            line: self.line.clone(),
            width: Duration::from_millis(self.width_ms),
            polarity: self.polarity,
            lead: Duration::from_millis(self.lead_ms),
            trail: Duration::from_millis(self.trail_ms),
        }
    }
}

/// DAQ wiring of the device under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// Analog output driving J
    pub j_channel: String,
    /// Analog output driving K
    pub k_channel: String,
    /// Declared analog output range
    pub output_min_volts: f64,
    pub output_max_volts: f64,
    /// Voltage used for a logic-high input
    pub logic_high_volts: f64,
    /// Clock line (the synchronizing pulse)
    pub clock: PulseConfig,
    /// Asynchronous clear line
    pub clear: PulseConfig,
    /// Multiplexer select lines in C, B, A order
    pub mux_lines: Vec<String>,
    /// Scope channel wired to the clock (reference edge)
    pub scope_reference_channel: u8,
    /// Scope channel wired to Q
    pub scope_output_channel: u8,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            j_channel: "Dev1/ao0".to_string(),
            k_channel: "Dev1/ao1".to_string(),
            output_min_volts: 0.0,
            output_max_volts: 5.0,
            logic_high_volts: 5.0,
            clock: PulseConfig {
                line: "Dev1/port1/line1".to_string(),
                width_ms: 10,
                lead_ms: 10,
                trail_ms: 0,
                polarity: Polarity::ActiveHigh,
            },
            clear: PulseConfig {
                line: "Dev1/port1/line0".to_string(),
                width_ms: 500,
                lead_ms: 0,
                trail_ms: 500,
                polarity: Polarity::ActiveLow,
            },
            mux_lines: vec![
                "Dev1/port0/line0".to_string(),
                "Dev1/port0/line1".to_string(),
                "Dev1/port0/line2".to_string(),
            ],
            scope_reference_channel: 1,
            scope_output_channel: 2,
        }
    }
}

impl FixtureConfig {
    pub fn output_range(&self) -> OutputRange {
        OutputRange {
            min: self.output_min_volts,
            max: self.output_max_volts,
        }
    }
}

/// Which flip-flop input a threshold sweep drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweptInput {
    J,
    K,
}

/// A J/K input pair in volts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputPair {
    pub j: f64,
    pub k: f64,
}

/// Threshold sweep parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub swept_input: SweptInput,
    pub start_volts: f64,
    pub stop_volts: f64,
    pub step_volts: f64,
    pub direction: SweepDirection,
    /// Level held on the input that is not swept
    pub hold_volts: f64,
    /// Q voltage at or above which the output is labelled high
    pub logic_threshold: f64,
    /// Inputs clocked in once before the first step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preload: Option<InputPair>,
    /// Pulse the clear line before every step instead of once
    #[serde(default)]
    pub reset_each_point: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            swept_input: SweptInput::J,
            start_volts: 0.0,
            stop_volts: 1.5,
            step_volts: 0.05,
            direction: SweepDirection::Descending,
            hold_volts: 5.0,
            logic_threshold: 2.0,
            preload: Some(InputPair { j: 5.0, k: 0.0 }),
            reset_each_point: false,
        }
    }
}

impl SweepConfig {
    pub fn range(&self) -> SweepRange {
        SweepRange {
            start: self.start_volts,
            stop: self.stop_volts,
            step: self.step_volts,
        }
    }
}

/// Supply/input current measurement parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentConfig {
    /// Shunt resistor the differential voltage is measured across
    pub shunt_ohms: f64,
    /// Time the control lines are held before the ICC reading
    pub icc_arm_ms: u64,
    /// Time the control lines are held before the IIL reading
    pub iil_arm_ms: u64,
    /// Settling after each mux change
    pub settle_ms: u64,
}

impl Default for CurrentConfig {
    fn default() -> Self {
        Self {
            shunt_ohms: 1.0,
            icc_arm_ms: 3000,
            iil_arm_ms: 20_000,
            settle_ms: 3000,
        }
    }
}

/// Setup-time pass/fail test parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupTimeConfig {
    /// Candidate setup times, tested in this order
    pub candidates_ns: Vec<u64>,
    /// Wait between the clock pulse and the output capture
    pub capture_delay_us: u64,
}

impl Default for SetupTimeConfig {
    fn default() -> Self {
        Self {
            candidates_ns: vec![20, 10],
            capture_delay_us: 100,
        }
    }
}

/// Serial link parameters for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    /// OS port name, e.g. `/dev/ttyUSB0` or `COM9`
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_write_terminator")]
    pub write_terminator: String,
    #[serde(default = "default_read_terminator")]
    pub read_terminator: char,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_write_terminator() -> String {
    "\r\n".to_string()
}

fn default_read_terminator() -> char {
    '\n'
}

fn default_function_settle_ms() -> u64 {
    2000
}

fn default_record_length() -> usize {
    2500
}

fn default_supply_channels() -> Vec<String> {
    vec!["CH1".to_string(), "CH2".to_string()]
}

fn default_supply_volts() -> f64 {
    5.0
}

fn default_current_limit() -> f64 {
    0.1
}

fn default_off_time_ms() -> u64 {
    3000
}

/// Fluke 45 multimeter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultimeterConfig {
    #[serde(flatten)]
    pub serial: SerialSettings,
    /// Wait after selecting the DC volts function
    #[serde(default = "default_function_settle_ms")]
    pub function_settle_ms: u64,
}

/// Digital storage oscilloscope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscilloscopeConfig {
    #[serde(flatten)]
    pub serial: SerialSettings,
    /// Samples transferred per capture
    #[serde(default = "default_record_length")]
    pub record_length: usize,
    #[serde(default)]
    pub setup: ScopeSetup,
}

/// Bench power supply feeding the fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSupplyConfig {
    #[serde(flatten)]
    pub serial: SerialSettings,
    #[serde(default = "default_supply_channels")]
    pub channels: Vec<String>,
    #[serde(default = "default_supply_volts")]
    pub supply_volts: f64,
    #[serde(default = "default_current_limit")]
    pub current_limit_amps: f64,
    /// How long outputs stay off during a power cycle
    #[serde(default = "default_off_time_ms")]
    pub off_time_ms: u64,
}

/// Function generator; programmed on open, output switched off on close
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionGeneratorConfig {
    #[serde(flatten)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub square: SquareWave,
    /// Leave the output enabled after open; off by default since the DAQ drives CLK
    #[serde(default)]
    pub output_on_open: bool,
}

/// Serial instruments; each one is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multimeter: Option<MultimeterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oscilloscope: Option<OscilloscopeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_supply: Option<PowerSupplyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_generator: Option<FunctionGeneratorConfig>,
}

impl BenchConfig {
    /// Load configuration from `config/bench.toml` and environment variables
    ///
    /// Environment variables override file values with prefix `LOGIC_BENCH_`.
    /// Example: `LOGIC_BENCH_READER__MAX_ATTEMPTS=3`
    pub fn load() -> BenchResult<Self> {
        Self::load_from("config/bench.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error: defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> BenchResult<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(BenchConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LOGIC_BENCH_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        is_ordered_bounds(self.reader.min_volts, self.reader.max_volts)
            .map_err(|e| format!("reader bounds: {e}"))?;
        if self.reader.max_attempts == 0 {
            return Err("reader.max_attempts must be at least 1".to_string());
        }

        let fixture = &self.fixture;
        is_ordered_bounds(fixture.output_min_volts, fixture.output_max_volts)
            .map_err(|e| format!("fixture output range: {e}"))?;
        for (what, name) in [
            ("j_channel", &fixture.j_channel),
            ("k_channel", &fixture.k_channel),
            ("clock.line", &fixture.clock.line),
            ("clear.line", &fixture.clear.line),
        ] {
            is_valid_channel_name(name).map_err(|e| format!("fixture.{what}: {e}"))?;
        }
        if fixture.mux_lines.len() != 3 {
            return Err(format!(
                "fixture.mux_lines must name 3 lines (C, B, A), got {}",
                fixture.mux_lines.len()
            ));
        }
        for line in &fixture.mux_lines {
            is_valid_channel_name(line).map_err(|e| format!("fixture.mux_lines: {e}"))?;
        }
        let output_range = fixture.output_min_volts..=fixture.output_max_volts;
        is_in_range(fixture.logic_high_volts, output_range.clone())
            .map_err(|e| format!("fixture.logic_high_volts: {e}"))?;

        let sweep = &self.sweep;
        if !(sweep.step_volts > 0.0 && sweep.step_volts.is_finite()) {
            return Err(format!(
                "sweep.step_volts must be positive, got {}",
                sweep.step_volts
            ));
        }
        is_ordered_bounds(sweep.start_volts, sweep.stop_volts)
            .map_err(|e| format!("sweep range: {e}"))?;
        if sweep.range().point_count().is_none() {
            return Err(format!(
                "sweep range [{}, {}] with step {} exceeds {} points",
                sweep.start_volts, sweep.stop_volts, sweep.step_volts, MAX_SWEEP_POINTS
            ));
        }
        for (what, value) in [
            ("start_volts", sweep.start_volts),
            ("stop_volts", sweep.stop_volts),
            ("hold_volts", sweep.hold_volts),
        ] {
            is_in_range(value, output_range.clone()).map_err(|e| format!("sweep.{what}: {e}"))?;
        }

        if !(self.current.shunt_ohms > 0.0) {
            return Err("current.shunt_ohms must be positive".to_string());
        }

        if let Some(dmm) = &self.instruments.multimeter {
            is_not_empty(&dmm.serial.port).map_err(|e| format!("multimeter port: {e}"))?;
        }
        if let Some(scope) = &self.instruments.oscilloscope {
            is_not_empty(&scope.serial.port).map_err(|e| format!("oscilloscope port: {e}"))?;
            if scope.record_length == 0 {
                return Err("oscilloscope.record_length must be positive".to_string());
            }
        }
        if let Some(supply) = &self.instruments.power_supply {
            is_not_empty(&supply.serial.port).map_err(|e| format!("power supply port: {e}"))?;
        }
        if let Some(generator) = &self.instruments.function_generator {
            is_not_empty(&generator.serial.port)
                .map_err(|e| format!("function generator port: {e}"))?;
            let wave = &generator.square;
            if !(wave.frequency_hz > 0.0 && wave.frequency_hz.is_finite()) {
                return Err(format!(
                    "function_generator.square.frequency_hz must be positive, got {}",
                    wave.frequency_hz
                ));
            }
            if !(wave.amplitude_vpp >= 0.0) {
                return Err("function_generator.square.amplitude_vpp must not be negative".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let config = BenchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reader.max_attempts, 5);
        assert_eq!(config.fixture.clear.polarity, Polarity::ActiveLow);
    }

    #[test]
    fn rejects_inverted_reader_bounds() {
        let mut config = BenchConfig::default();
        config.reader.min_volts = 6.0;
        config.reader.max_volts = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("reader bounds"));
    }

    #[test]
    fn rejects_zero_attempts_and_bad_log_level() {
        let mut config = BenchConfig::default();
        config.reader.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = BenchConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("log_level"));
    }

    #[test]
    fn rejects_sweep_outside_output_range() {
        let mut config = BenchConfig::default();
        config.sweep.stop_volts = 7.0;
        assert!(config.validate().unwrap_err().contains("stop_volts"));
    }

    #[test]
    fn rejects_short_mux() {
        let mut config = BenchConfig::default();
        config.fixture.mux_lines.pop();
        assert!(config.validate().unwrap_err().contains("mux_lines"));
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[timing]
settle_ms = 50
latch_delay_ms = 100
retry_delay_ms = 250

[sweep]
swept_input = "k"
start_volts = 0.5
stop_volts = 2.5
step_volts = 0.5
direction = "ascending"
hold_volts = 0.0
logic_threshold = 2.5

[instruments.multimeter]
port = "/dev/ttyUSB3"
"#
        )
        .unwrap();

        let config = BenchConfig::load_from(file.path()).unwrap();
        assert_eq!(config.timing.settle(), Duration::from_millis(50));
        assert_eq!(config.sweep.swept_input, SweptInput::K);
        assert_eq!(config.sweep.direction, SweepDirection::Ascending);
        // untouched sections keep their defaults
        assert_eq!(config.reader.max_attempts, 5);
        assert_eq!(config.fixture.j_channel, "Dev1/ao0");
        let dmm = config.instruments.multimeter.unwrap();
        assert_eq!(dmm.serial.port, "/dev/ttyUSB3");
        assert_eq!(dmm.serial.baud_rate, 9600);
        assert_eq!(dmm.function_settle_ms, 2000);
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "bench.toml",
                r#"
[reader]
min_volts = 0.0
max_volts = 6.0
max_attempts = 5
"#,
            )?;
            jail.set_env("LOGIC_BENCH_READER__MAX_ATTEMPTS", "2");
            jail.set_env("LOGIC_BENCH_APPLICATION__LOG_LEVEL", "debug");

            let config = BenchConfig::load_from("bench.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.reader.max_attempts, 2);
            assert_eq!(config.application.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn env_step_too_small_for_sweep_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LOGIC_BENCH_SWEEP__STEP_VOLTS", "0.000000000001");
            let config = BenchConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.sweep.step_volts, 1e-12);
            let err = config.validate().unwrap_err();
            assert!(err.contains("points"), "{err}");
            Ok(())
        });
    }
}
