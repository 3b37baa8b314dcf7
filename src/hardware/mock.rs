//! Mock Hardware Implementations
//!
//! Simulated devices for running the bench without a fixture attached. Used by the
//! test suite and by `logic-bench --simulate`.
//!
//! # Available Mocks
//!
//! - [`SimulatedFixture`] - a JK flip-flop wired to a DAQ card, multimeter, scope,
//!   supply and function generator. Hands out one handle per capability; all handles
//!   share one model.
//! - [`ScriptedPort`] - an `InstrumentPort` that replays canned replies and records
//!   every command, for exercising instrument command layers.
//!
//! # Flip-flop model
//!
//! - Negative-edge clock: J/K are latched when the clock line goes high → low
//! - Active-low asynchronous clear: Q is forced low while the clear line is low
//! - J/K inputs are Schmitt-style: a low input reads high at `input_rising_threshold`,
//!   a high input reads low at `input_falling_threshold`
//! - An input changed less than `min_setup` before the clock edge latches its old value
//! - Q drives `output_high` / `output_low` volts

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::FixtureConfig;
use crate::error::{BenchError, BenchResult};
use crate::hardware::capabilities::{AnalogOutput, DigitalOutput, InstrumentPort, WaveformCapture};
use crate::instrument::SquareWave;
use crate::waveform::Waveform;

// =============================================================================
// Model parameters
// =============================================================================

/// Electrical behaviour of the simulated DUT.
#[derive(Debug, Clone)]
pub struct FixtureModel {
    pub input_rising_threshold: f64,
    pub input_falling_threshold: f64,
    pub output_high: f64,
    pub output_low: f64,
    /// Clock edge to Q change, seconds
    pub propagation_delay: f64,
    pub min_setup: Duration,
    /// Multimeter voltage per mux code; code 0 is wired to Q
    pub mux_node_volts: [f64; 8],
}

impl Default for FixtureModel {
    fn default() -> Self {
        Self {
            input_rising_threshold: 1.5,
            input_falling_threshold: 1.1,
            output_high: 3.4,
            output_low: 0.2,
            propagation_delay: 20e-9,
            min_setup: Duration::ZERO,
            // 0: Q, 1: IIL loaded, 2: IIL reference, 3: ICC loaded
            mux_node_volts: [0.0, 4.9996, 5.0, 3.392, 0.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Scope acquisition geometry.
const SCOPE_SAMPLES: usize = 200;
const SCOPE_PRETRIGGER: usize = 50;
const SCOPE_SAMPLE_INTERVAL: f64 = 1e-9;
const CLOCK_HIGH_VOLTS: f64 = 5.0;

/// One output write observed by the fixture.
#[derive(Debug, Clone, PartialEq)]
pub enum BenchEvent {
    Voltage(String, f64),
    Line(String, bool),
}

#[derive(Debug, Clone)]
struct Wiring {
    j: String,
    k: String,
    clock: String,
    clear: String,
    mux: Vec<String>,
    reference_channel: u8,
    output_channel: u8,
}

impl From<&FixtureConfig> for Wiring {
    fn from(config: &FixtureConfig) -> Self {
        Self {
            j: config.j_channel.clone(),
            k: config.k_channel.clone(),
            clock: config.clock.line.clone(),
            clear: config.clear.line.clone(),
            mux: config.mux_lines.clone(),
            reference_channel: config.scope_reference_channel,
            output_channel: config.scope_output_channel,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LogicInput {
    high: bool,
    previous: bool,
    changed_at: Instant,
}

impl LogicInput {
    fn new() -> Self {
        Self {
            high: false,
            previous: false,
            changed_at: Instant::now(),
        }
    }

    fn drive(&mut self, volts: f64, model: &FixtureModel) {
        let next = if self.high {
            volts > model.input_falling_threshold
        } else {
            volts >= model.input_rising_threshold
        };
        if next != self.high {
            self.previous = self.high;
            self.high = next;
            self.changed_at = Instant::now();
        }
    }

    fn latched(&self, min_setup: Duration) -> bool {
        if self.changed_at.elapsed() < min_setup {
            self.previous
        } else {
            self.high
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ClockEdge {
    q_before: bool,
    q_after: bool,
}

struct FixtureState {
    wiring: Wiring,
    model: FixtureModel,
    voltages: HashMap<String, f64>,
    lines: HashMap<String, bool>,
    j: LogicInput,
    k: LogicInput,
    q: bool,
    last_edge: Option<ClockEdge>,
    events: Vec<BenchEvent>,
    analog_fail_all: bool,
    analog_fail_at: Option<usize>,
    meter_replies: VecDeque<Option<String>>,
    meter_commands: Vec<String>,
    supply_commands: Vec<String>,
    supply_rejects: Option<String>,
    generator_commands: Vec<String>,
    fail_captures: bool,
}

impl FixtureState {
    fn set_voltage(&mut self, channel: &str, volts: f64) -> BenchResult<()> {
        if self.analog_fail_all {
            return Err(BenchError::output(channel, "simulated output failure"));
        }
        match self.analog_fail_at {
            Some(0) => {
                self.analog_fail_at = None;
                return Err(BenchError::output(channel, "simulated output glitch"));
            }
            Some(n) => self.analog_fail_at = Some(n - 1),
            None => {}
        }
        self.voltages.insert(channel.to_string(), volts);
        self.events
            .push(BenchEvent::Voltage(channel.to_string(), volts));

        if channel == self.wiring.j {
            self.j.drive(volts, &self.model);
        } else if channel == self.wiring.k {
            self.k.drive(volts, &self.model);
        }
        Ok(())
    }

    fn set_line(&mut self, line: &str, high: bool) {
        let was = self.lines.insert(line.to_string(), high);
        self.events.push(BenchEvent::Line(line.to_string(), high));

        if line == self.wiring.clear {
            if !high {
                self.q = false;
            }
        } else if line == self.wiring.clock && was == Some(true) && !high && self.clear_released() {
            self.clock_edge();
        }
    }

    fn clear_released(&self) -> bool {
        self.lines.get(&self.wiring.clear).copied().unwrap_or(true)
    }

    fn clock_edge(&mut self) {
        let j = self.j.latched(self.model.min_setup);
        let k = self.k.latched(self.model.min_setup);
        let before = self.q;
        self.q = match (j, k) {
            (false, false) => before,
            (true, false) => true,
            (false, true) => false,
            (true, true) => !before,
        };
        self.last_edge = Some(ClockEdge {
            q_before: before,
            q_after: self.q,
        });
    }

    fn q_volts(&self, q: bool) -> f64 {
        if q {
            self.model.output_high
        } else {
            self.model.output_low
        }
    }

    fn mux_code(&self) -> usize {
        // lines are listed C, B, A; A is the least significant bit
        self.wiring.mux.iter().fold(0, |code, line| {
            (code << 1) | usize::from(self.lines.get(line).copied().unwrap_or(false))
        })
    }

    fn meter_volts(&self) -> f64 {
        match self.mux_code() {
            0 => self.q_volts(self.q),
            code => self.model.mux_node_volts[code.min(7)],
        }
    }

    fn trace(&self, channel: u8) -> BenchResult<Waveform> {
        if self.fail_captures {
            return Err(BenchError::communication("sim-scope", "simulated capture failure"));
        }
        let edge = self.last_edge.unwrap_or(ClockEdge {
            q_before: self.q,
            q_after: self.q,
        });
        let delay_samples = (self.model.propagation_delay / SCOPE_SAMPLE_INTERVAL).round() as usize;
        let times: Vec<f64> = (0..SCOPE_SAMPLES)
            .map(|i| (i as f64 - SCOPE_PRETRIGGER as f64) * SCOPE_SAMPLE_INTERVAL)
            .collect();

        let volts: Vec<f64> = if channel == self.wiring.reference_channel {
            (0..SCOPE_SAMPLES)
                .map(|i| if i < SCOPE_PRETRIGGER { CLOCK_HIGH_VOLTS } else { 0.0 })
                .collect()
        } else if channel == self.wiring.output_channel {
            (0..SCOPE_SAMPLES)
                .map(|i| {
                    let q = if i < SCOPE_PRETRIGGER + delay_samples {
                        edge.q_before
                    } else {
                        edge.q_after
                    };
                    self.q_volts(q)
                })
                .collect()
        } else {
            vec![0.0; SCOPE_SAMPLES]
        };

        Waveform::new(format!("CH{channel}"), times, volts)
    }
}

/// Format like a Fluke 45 slow-rate reading: `+3.4000E+0`.
pub fn fluke_format(volts: f64) -> String {
    let sign = if volts < 0.0 { '-' } else { '+' };
    let formatted = format!("{:.4E}", volts.abs());
    match formatted.split_once('E') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            format!("{sign}{mantissa}E{exp:+}")
        }
        None => format!("{sign}{formatted}"),
    }
}

// =============================================================================
// SimulatedFixture
// =============================================================================

/// A simulated JK flip-flop fixture.
///
/// Cloning shares the same model. Capability handles are cheap and may be created
/// any number of times.
///
/// # Example
///
/// ```rust
/// use logic_bench::hardware::mock::SimulatedFixture;
/// use logic_bench::hardware::capabilities::{AnalogOutput, InstrumentPort};
///
/// let fixture = SimulatedFixture::new();
/// let mut ao = fixture.analog_output();
/// ao.set_voltage("Dev1/ao0", 5.0)?;
/// assert_eq!(fixture.voltage("Dev1/ao0"), Some(5.0));
///
/// let mut dmm = fixture.multimeter();
/// assert_eq!(dmm.query("MEAS1?")?, "+2.0000E-1+2.0000E-1");
/// # Ok::<(), logic_bench::BenchError>(())
/// ```
#[derive(Clone)]
pub struct SimulatedFixture {
    state: Arc<Mutex<FixtureState>>,
}

impl SimulatedFixture {
    /// Fixture wired like the default configuration.
    pub fn new() -> Self {
        Self::from_config(&FixtureConfig::default(), FixtureModel::default())
    }

    pub fn from_config(config: &FixtureConfig, model: FixtureModel) -> Self {
        let state = FixtureState {
            wiring: Wiring::from(config),
            model,
            voltages: HashMap::new(),
            lines: HashMap::new(),
            j: LogicInput::new(),
            k: LogicInput::new(),
            q: false,
            last_edge: None,
            events: Vec::new(),
            analog_fail_all: false,
            analog_fail_at: None,
            meter_replies: VecDeque::new(),
            meter_commands: Vec::new(),
            supply_commands: Vec::new(),
            supply_rejects: None,
            generator_commands: Vec::new(),
            fail_captures: false,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn analog_output(&self) -> SimulatedAnalogOutput {
        SimulatedAnalogOutput {
            state: Arc::clone(&self.state),
        }
    }

    pub fn digital_output(&self) -> SimulatedDigitalOutput {
        SimulatedDigitalOutput {
            state: Arc::clone(&self.state),
        }
    }

    pub fn multimeter(&self) -> SimulatedMultimeter {
        SimulatedMultimeter {
            state: Arc::clone(&self.state),
        }
    }

    pub fn scope(&self) -> SimulatedScope {
        SimulatedScope {
            state: Arc::clone(&self.state),
        }
    }

    pub fn power_supply(&self) -> SimulatedSupply {
        SimulatedSupply {
            state: Arc::clone(&self.state),
        }
    }

    pub fn function_generator(&self) -> SimulatedGenerator {
        SimulatedGenerator {
            state: Arc::clone(&self.state),
            wave: SquareWave::default(),
            output_on: false,
        }
    }

    /// Current Q state.
    pub fn q(&self) -> bool {
        self.state.lock().q
    }

    pub fn voltage(&self, channel: &str) -> Option<f64> {
        self.state.lock().voltages.get(channel).copied()
    }

    pub fn line(&self, line: &str) -> Option<bool> {
        self.state.lock().lines.get(line).copied()
    }

    /// Every output write so far, in order.
    pub fn events(&self) -> Vec<BenchEvent> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Make every analog write fail (`true`) or succeed (`false`).
    pub fn fail_analog_writes(&self, fail: bool) {
        self.state.lock().analog_fail_all = fail;
    }

    /// Let `n` more analog writes succeed, fail the next one, then recover.
    pub fn fail_analog_write_after(&self, n: usize) {
        self.state.lock().analog_fail_at = Some(n);
    }

    pub fn fail_captures(&self, fail: bool) {
        self.state.lock().fail_captures = fail;
    }

    /// Queue replies for the next `MEAS1?` queries; `None` simulates no answer.
    pub fn queue_meter_replies<I>(&self, replies: I)
    where
        I: IntoIterator<Item = Option<String>>,
    {
        self.state.lock().meter_replies.extend(replies);
    }

    pub fn meter_commands(&self) -> Vec<String> {
        self.state.lock().meter_commands.clone()
    }

    pub fn supply_commands(&self) -> Vec<String> {
        self.state.lock().supply_commands.clone()
    }

    /// Make the supply reject every write of exactly `command`.
    pub fn reject_supply_command(&self, command: impl Into<String>) {
        self.state.lock().supply_rejects = Some(command.into());
    }

    pub fn generator_commands(&self) -> Vec<String> {
        self.state.lock().generator_commands.clone()
    }
}

impl Default for SimulatedFixture {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Capability handles
// =============================================================================

pub struct SimulatedAnalogOutput {
    state: Arc<Mutex<FixtureState>>,
}

impl AnalogOutput for SimulatedAnalogOutput {
    fn set_voltage(&mut self, channel: &str, volts: f64) -> BenchResult<()> {
        self.state.lock().set_voltage(channel, volts)
    }
}

pub struct SimulatedDigitalOutput {
    state: Arc<Mutex<FixtureState>>,
}

impl DigitalOutput for SimulatedDigitalOutput {
    fn set_line(&mut self, line: &str, high: bool) -> BenchResult<()> {
        self.state.lock().set_line(line, high);
        Ok(())
    }
}

/// Fluke 45 lookalike: answers `MEAS1?` and `VAL1?` with the value printed twice.
pub struct SimulatedMultimeter {
    state: Arc<Mutex<FixtureState>>,
}

impl InstrumentPort for SimulatedMultimeter {
    fn id(&self) -> &str {
        "sim-multimeter"
    }

    fn write(&mut self, command: &str) -> BenchResult<()> {
        self.state.lock().meter_commands.push(command.to_string());
        Ok(())
    }

    fn query(&mut self, command: &str) -> BenchResult<String> {
        let mut state = self.state.lock();
        state.meter_commands.push(command.to_string());
        if command == "MEAS1?" {
            if let Some(scripted) = state.meter_replies.pop_front() {
                return scripted
                    .ok_or_else(|| BenchError::communication(self.id(), "no reply"));
            }
        }
        let value = fluke_format(state.meter_volts());
        Ok(format!("{value}{value}"))
    }
}

pub struct SimulatedScope {
    state: Arc<Mutex<FixtureState>>,
}

impl WaveformCapture for SimulatedScope {
    fn capture(&mut self, channel: u8) -> BenchResult<Waveform> {
        self.state.lock().trace(channel)
    }
}

/// Power supply lookalike: accepts every command not marked as rejected, answers
/// queries with `0`.
pub struct SimulatedSupply {
    state: Arc<Mutex<FixtureState>>,
}

impl InstrumentPort for SimulatedSupply {
    fn id(&self) -> &str {
        "sim-supply"
    }

    fn write(&mut self, command: &str) -> BenchResult<()> {
        let mut state = self.state.lock();
        if state.supply_rejects.as_deref() == Some(command) {
            return Err(BenchError::communication(self.id(), "command rejected"));
        }
        state.supply_commands.push(command.to_string());
        Ok(())
    }

    fn query(&mut self, command: &str) -> BenchResult<String> {
        self.state.lock().supply_commands.push(command.to_string());
        Ok("0".to_string())
    }
}

/// AFG-2005 lookalike: identifies itself, tracks the applied square wave and output
/// state, and records every command in the fixture.
pub struct SimulatedGenerator {
    state: Arc<Mutex<FixtureState>>,
    wave: SquareWave,
    output_on: bool,
}

impl SimulatedGenerator {
    fn apply(&mut self, command: &str) -> BenchResult<()> {
        if let Some(args) = command.strip_prefix("SOUR1:APPLy:SQU ") {
            let values: Vec<f64> = args
                .split(',')
                .map(|v| v.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| BenchError::communication(self.id(), "bad APPLy arguments"))?;
            if let [frequency_hz, amplitude_vpp, offset_volts] = values[..] {
                self.wave = SquareWave {
                    frequency_hz,
                    amplitude_vpp,
                    offset_volts,
                };
            }
        } else if command == "OUTP1 ON" {
            self.output_on = true;
        } else if command == "OUTP1 OFF" {
            self.output_on = false;
        }
        Ok(())
    }
}

impl InstrumentPort for SimulatedGenerator {
    fn id(&self) -> &str {
        "sim-generator"
    }

    fn write(&mut self, command: &str) -> BenchResult<()> {
        self.state.lock().generator_commands.push(command.to_string());
        self.apply(command)
    }

    fn query(&mut self, command: &str) -> BenchResult<String> {
        self.state.lock().generator_commands.push(command.to_string());
        let reply = match command {
            "*IDN?" => "GW INSTEK,AFG-2005,SN:SIM0001,V1.00".to_string(),
            "SOUR1:FREQ?" => self.wave.frequency_hz.to_string(),
            "SOUR1:VOLT?" => self.wave.amplitude_vpp.to_string(),
            "SOUR1:VOLT:OFFS?" => self.wave.offset_volts.to_string(),
            "OUTP1?" => (if self.output_on { "1" } else { "0" }).to_string(),
            _ => return Err(BenchError::communication(self.id(), "unknown query")),
        };
        Ok(reply)
    }
}

// =============================================================================
// ScriptedPort
// =============================================================================

/// An `InstrumentPort` that replays canned replies.
///
/// Queries matching a fixed response are answered from it; everything else takes the
/// next queued reply, where `None` (or an empty queue) is a timeout.
pub struct ScriptedPort {
    id: String,
    fixed: HashMap<String, String>,
    replies: VecDeque<Option<String>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPort {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fixed: HashMap::new(),
            replies: VecDeque::new(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer `command` with `reply`.
    pub fn respond(mut self, command: impl Into<String>, reply: impl Into<String>) -> Self {
        self.fixed.insert(command.into(), reply.into());
        self
    }

    /// Queue the next reply for any query without a fixed response.
    pub fn then_reply(mut self, reply: impl Into<String>) -> Self {
        self.replies.push_back(Some(reply.into()));
        self
    }

    /// Queue a timeout.
    pub fn then_timeout(mut self) -> Self {
        self.replies.push_back(None);
        self
    }

    /// Shared view of every command sent, queries included.
    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }
}

impl InstrumentPort for ScriptedPort {
    fn id(&self) -> &str {
        &self.id
    }

    fn write(&mut self, command: &str) -> BenchResult<()> {
        self.log.lock().push(command.to_string());
        Ok(())
    }

    fn query(&mut self, command: &str) -> BenchResult<String> {
        self.log.lock().push(command.to_string());
        if let Some(reply) = self.fixed.get(command) {
            return Ok(reply.clone());
        }
        match self.replies.pop_front() {
            Some(Some(reply)) => Ok(reply),
            _ => Err(BenchError::Timeout {
                instrument: self.id.clone(),
                timeout: Duration::ZERO,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const J: &str = "Dev1/ao0";
    const K: &str = "Dev1/ao1";
    const CLK: &str = "Dev1/port1/line1";
    const CLR: &str = "Dev1/port1/line0";

    fn clock(fixture: &SimulatedFixture) {
        let mut dio = fixture.digital_output();
        dio.set_line(CLK, false).unwrap();
        dio.set_line(CLK, true).unwrap();
        dio.set_line(CLK, false).unwrap();
    }

    fn inputs(fixture: &SimulatedFixture, j: f64, k: f64) {
        let mut ao = fixture.analog_output();
        ao.set_voltage(J, j).unwrap();
        ao.set_voltage(K, k).unwrap();
    }

    #[test]
    fn jk_truth_table() {
        let fixture = SimulatedFixture::new();
        inputs(&fixture, 5.0, 0.0);
        clock(&fixture);
        assert!(fixture.q(), "set");
        inputs(&fixture, 0.0, 0.0);
        clock(&fixture);
        assert!(fixture.q(), "hold");
        inputs(&fixture, 5.0, 5.0);
        clock(&fixture);
        assert!(!fixture.q(), "toggle");
        inputs(&fixture, 0.0, 5.0);
        clock(&fixture);
        assert!(!fixture.q(), "reset");
    }

    #[test]
    fn latches_on_falling_edge_only() {
        let fixture = SimulatedFixture::new();
        inputs(&fixture, 5.0, 0.0);
        let mut dio = fixture.digital_output();
        dio.set_line(CLK, false).unwrap();
        dio.set_line(CLK, true).unwrap();
        assert!(!fixture.q());
        dio.set_line(CLK, false).unwrap();
        assert!(fixture.q());
    }

    #[test]
    fn clear_is_active_low() {
        let fixture = SimulatedFixture::new();
        inputs(&fixture, 5.0, 0.0);
        clock(&fixture);
        assert!(fixture.q());
        let mut dio = fixture.digital_output();
        dio.set_line(CLR, false).unwrap();
        assert!(!fixture.q());
        // clocks are ignored while clear is held
        clock(&fixture);
        assert!(!fixture.q());
        dio.set_line(CLR, true).unwrap();
        clock(&fixture);
        assert!(fixture.q());
    }

    #[test]
    fn inputs_have_hysteresis() {
        let fixture = SimulatedFixture::new();
        let mut ao = fixture.analog_output();
        ao.set_voltage(K, 0.0).unwrap();
        ao.set_voltage(J, 1.3).unwrap();
        clock(&fixture);
        assert!(!fixture.q(), "1.3 V is still low on the way up");
        ao.set_voltage(J, 1.5).unwrap();
        clock(&fixture);
        assert!(fixture.q());

        let mut dio = fixture.digital_output();
        dio.set_line(CLR, false).unwrap();
        dio.set_line(CLR, true).unwrap();
        ao.set_voltage(J, 1.3).unwrap();
        clock(&fixture);
        assert!(fixture.q(), "1.3 V is still high on the way down");
    }

    #[test]
    fn multimeter_follows_q_and_mux() {
        let fixture = SimulatedFixture::new();
        let mut dmm = fixture.multimeter();
        assert_eq!(dmm.query("MEAS1?").unwrap(), "+2.0000E-1+2.0000E-1");
        inputs(&fixture, 5.0, 0.0);
        clock(&fixture);
        assert_eq!(dmm.query("MEAS1?").unwrap(), "+3.4000E+0+3.4000E+0");

        let mut dio = fixture.digital_output();
        // code 3 = B and A high
        dio.set_line("Dev1/port0/line1", true).unwrap();
        dio.set_line("Dev1/port0/line2", true).unwrap();
        assert_eq!(dmm.query("MEAS1?").unwrap(), "+3.3920E+0+3.3920E+0");
    }

    #[test]
    fn scripted_meter_replies_take_priority() {
        let fixture = SimulatedFixture::new();
        fixture.queue_meter_replies([Some("9.9".to_string()), None]);
        let mut dmm = fixture.multimeter();
        assert_eq!(dmm.query("MEAS1?").unwrap(), "9.9");
        assert!(dmm.query("MEAS1?").is_err());
        assert!(dmm.query("MEAS1?").unwrap().starts_with("+2.0000E-1"));
    }

    #[test]
    fn one_shot_analog_glitch() {
        let fixture = SimulatedFixture::new();
        fixture.fail_analog_write_after(1);
        let mut ao = fixture.analog_output();
        assert!(ao.set_voltage(J, 1.0).is_ok());
        assert!(ao.set_voltage(J, 2.0).is_err());
        assert_eq!(fixture.voltage(J), Some(1.0));
        assert!(ao.set_voltage(J, 3.0).is_ok());
    }

    #[test]
    fn scope_shows_delayed_output_edge() {
        let fixture = SimulatedFixture::new();
        inputs(&fixture, 5.0, 0.0);
        clock(&fixture);
        let mut scope = fixture.scope();
        let clk = scope.capture(1).unwrap();
        let q = scope.capture(2).unwrap();
        assert_eq!(clk.len(), q.len());
        assert_eq!(q.volts()[0], 0.2);
        assert_eq!(q.volts()[SCOPE_PRETRIGGER + 20], 3.4);
        assert_eq!(q.volts()[SCOPE_PRETRIGGER + 19], 0.2);
    }

    #[test]
    fn fluke_formatting() {
        assert_eq!(fluke_format(3.4), "+3.4000E+0");
        assert_eq!(fluke_format(0.2), "+2.0000E-1");
        assert_eq!(fluke_format(-0.00125), "-1.2500E-3");
        assert_eq!(fluke_format(0.0), "+0.0000E+0");
        assert_eq!(fluke_format(4.9996), "+4.9996E+0");
    }

    #[test]
    fn scripted_port_replays_in_order() {
        let mut port = ScriptedPort::new("dmm")
            .respond("*IDN?", "FLUKE,45")
            .then_reply("1.0")
            .then_timeout();
        let log = port.log();
        assert_eq!(port.query("*IDN?").unwrap(), "FLUKE,45");
        assert_eq!(port.query("MEAS1?").unwrap(), "1.0");
        assert!(matches!(
            port.query("MEAS1?"),
            Err(BenchError::Timeout { .. })
        ));
        port.write("VOLT").unwrap();
        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn generator_reports_applied_wave() {
        use crate::instrument::Afg2005;

        let fixture = SimulatedFixture::new();
        let mut afg = Afg2005::new(fixture.function_generator());
        let wave = SquareWave {
            frequency_hz: 250.0,
            amplitude_vpp: 3.3,
            offset_volts: 1.65,
        };
        afg.apply_square(&wave).unwrap();
        afg.set_output(true).unwrap();

        let state = afg.state().unwrap();
        assert_eq!(state.wave, wave);
        assert!(state.output_on);
        assert_eq!(fixture.generator_commands()[0], "SOUR1:APPLy:SQU 250,3.3,1.65");
    }
}
