//! End-to-end procedures through `Bench` on the simulated fixture.

use std::time::Duration;

use logic_bench::config::{
    BenchConfig, FunctionGeneratorConfig, PowerSupplyConfig, SerialSettings,
};
use logic_bench::hardware::mock::{FixtureModel, SimulatedFixture};
use logic_bench::instrument::SquareWave;
use logic_bench::measurement::LastReply;
use logic_bench::sweep::{LogicLevel, SweepDirection};
use logic_bench::waveform::DelayMode;
use logic_bench::{Bench, BenchError};

/// Default wiring with every wait removed.
fn fast_config() -> BenchConfig {
    let mut config = BenchConfig::default();
    config.timing.settle_ms = 0;
    config.timing.latch_delay_ms = 0;
    config.timing.retry_delay_ms = 0;
    for pulse in [&mut config.fixture.clock, &mut config.fixture.clear] {
        pulse.width_ms = 0;
        pulse.lead_ms = 0;
        pulse.trail_ms = 0;
    }
    config.current.icc_arm_ms = 0;
    config.current.iil_arm_ms = 0;
    config.current.settle_ms = 0;
    config.setup_time.capture_delay_us = 0;
    config
}

fn open_bench(config: BenchConfig, model: FixtureModel) -> (Bench, SimulatedFixture) {
    let fixture = SimulatedFixture::from_config(&config.fixture, model);
    let mut bench = Bench::simulated(config, &fixture);
    bench.open().unwrap();
    (bench, fixture)
}

#[test]
fn test_descending_sweep_ends_low() {
    let (mut bench, fixture) = open_bench(fast_config(), FixtureModel::default());
    let result = bench.sweep().unwrap();

    assert_eq!(result.len(), 31);
    assert_eq!(result.direction, Some(SweepDirection::Descending));
    assert_eq!(result.points()[0].stimulus, 1.5);
    assert!(result.labels().iter().all(|l| l.is_determinate()));
    // J below its falling threshold with K high: Q stays reset
    for point in result.points().iter().filter(|p| p.stimulus < 1.0) {
        assert_eq!(point.label, LogicLevel::Low, "at {} V", point.stimulus);
    }
    assert_eq!(fixture.voltage("Dev1/ao0"), Some(0.0));
    assert_eq!(fixture.voltage("Dev1/ao1"), Some(0.0));
    bench.close().unwrap();
}

#[test]
fn test_hysteresis_matches_input_thresholds() {
    let (mut bench, _fixture) = open_bench(fast_config(), FixtureModel::default());
    let report = bench.hysteresis().unwrap();

    assert_eq!(report.ascending.direction, Some(SweepDirection::Ascending));
    assert_eq!(report.descending.direction, Some(SweepDirection::Descending));

    let h = report.hysteresis.expect("both sweeps switch");
    assert!((h.rising - 1.5).abs() < 0.051, "rising {}", h.rising);
    assert!((h.falling - 1.1).abs() < 0.051, "falling {}", h.falling);
    assert!(h.width > 0.3 && h.width < 0.5, "width {}", h.width);
}

#[test]
fn test_function_table_follows_jk_truth_table() {
    let (mut bench, _fixture) = open_bench(fast_config(), FixtureModel::default());
    let table = bench.function_table().unwrap();

    use LogicLevel::{High, Low};
    // clear, hold, set, reset, toggle
    assert_eq!(table.labels(), vec![Low, Low, High, Low, High]);
    assert!(table.entries.iter().all(|e| e.reading.is_valid()));
    assert!(table.to_string().starts_with(" CLR"));
}

#[test]
fn test_supply_and_input_currents() {
    let (mut bench, fixture) = open_bench(fast_config(), FixtureModel::default());
    let currents = bench.supply_currents().unwrap();

    assert_eq!(currents.len(), 2);
    assert_eq!(currents[0].name, "ICC");
    assert_eq!(currents[1].name, "IIL");
    let icc = currents[0].current.unwrap();
    let iil = currents[1].current.unwrap();
    assert!((icc - 0.008).abs() < 1e-6, "ICC {icc}");
    assert!((iil - 0.0004).abs() < 1e-6, "IIL {iil}");

    // mux returned to code 0 by teardown
    for line in ["Dev1/port0/line0", "Dev1/port0/line1", "Dev1/port0/line2"] {
        assert_eq!(fixture.line(line), Some(false));
    }
}

#[test]
fn test_unreadable_node_leaves_current_undefined() {
    let (mut bench, fixture) = open_bench(fast_config(), FixtureModel::default());
    // five attempts per reading; the ICC reference reading never parses
    fixture.queue_meter_replies(std::iter::repeat(Some("OVLD".to_string())).take(5));
    let currents = bench.supply_currents().unwrap();

    assert_eq!(currents[0].current, None);
    assert_eq!(currents[0].reference.attempts(), 5);
    assert!(matches!(
        currents[0].reference,
        logic_bench::measurement::Reading::Failed {
            last: LastReply::Unparsable(ref s),
            ..
        } if s == "OVLD"
    ));
    assert!(currents[1].current.is_some());
}

#[test]
fn test_propagation_delay_both_edges() {
    let (mut bench, _fixture) = open_bench(fast_config(), FixtureModel::default());

    let hl = bench.propagation_delay(DelayMode::HighToLow).unwrap();
    let delay = hl.delay.delay.expect("falling edge found");
    assert!((delay - 20e-9).abs() < 1e-12, "tPHL {delay}");
    assert_eq!(hl.reference.len(), hl.output.len());

    let lh = bench.propagation_delay(DelayMode::LowToHigh).unwrap();
    let delay = lh.delay.delay.expect("rising edge found");
    assert!((delay - 20e-9).abs() < 1e-12, "tPLH {delay}");
}

#[test]
fn test_capture_failure_is_reported() {
    let (mut bench, fixture) = open_bench(fast_config(), FixtureModel::default());
    fixture.fail_captures(true);
    assert!(matches!(
        bench.propagation_delay(DelayMode::HighToLow),
        Err(BenchError::Communication { .. })
    ));
    // inputs still quiesced after the failed procedure
    assert_eq!(fixture.voltage("Dev1/ao0"), Some(0.0));
}

#[test]
fn test_setup_time_passes_without_setup_requirement() {
    let (mut bench, _fixture) = open_bench(fast_config(), FixtureModel::default());
    let result = bench.setup_time().unwrap();

    assert_eq!(result.trials.len(), 2);
    assert!(result.trials.iter().all(|t| t.passed));
    assert_eq!(result.minimum_passing(), Some(Duration::from_nanos(10)));
}

#[test]
fn test_setup_time_fails_when_input_changes_too_late() {
    let model = FixtureModel {
        min_setup: Duration::from_secs(60),
        ..FixtureModel::default()
    };
    let (mut bench, _fixture) = open_bench(fast_config(), model);
    let result = bench.setup_time().unwrap();

    assert!(result.trials.iter().all(|t| !t.passed));
    assert_eq!(result.minimum_passing(), None);
    assert!(result.trials.iter().all(|t| t.peak.is_some()));
}

#[test]
fn test_setup_time_records_capture_failure_as_fail() {
    let (mut bench, fixture) = open_bench(fast_config(), FixtureModel::default());
    fixture.fail_captures(true);
    let result = bench.setup_time().unwrap();
    assert!(result.trials.iter().all(|t| !t.passed && t.peak.is_none()));
}

fn sim_serial() -> SerialSettings {
    SerialSettings {
        port: "sim".to_string(),
        baud_rate: 9600,
        timeout_ms: 1000,
        write_terminator: "\n".to_string(),
        read_terminator: '\n',
    }
}

fn supply_config(channels: &[&str]) -> PowerSupplyConfig {
    PowerSupplyConfig {
        serial: sim_serial(),
        channels: channels.iter().map(|c| c.to_string()).collect(),
        supply_volts: 5.0,
        current_limit_amps: 0.1,
        off_time_ms: 0,
    }
}

#[test]
fn test_supply_is_power_cycled_on_open_and_shut_down_on_close() {
    let mut config = fast_config();
    config.instruments.power_supply = Some(supply_config(&["CH1"]));
    let (mut bench, fixture) = open_bench(config, FixtureModel::default());

    let opened = fixture.supply_commands();
    assert!(opened.contains(&"OUTP CH1,OFF".to_string()));
    assert!(opened.contains(&"CH1:VOLT 5".to_string()));
    assert_eq!(opened.last().map(String::as_str), Some("OUTP CH1,ON"));

    bench.close().unwrap();
    let closed = fixture.supply_commands();
    assert_eq!(closed.last().map(String::as_str), Some("OUTP CH1,OFF"));
}

#[test]
fn test_multimeter_is_configured_on_open() {
    let (_bench, fixture) = open_bench(fast_config(), FixtureModel::default());
    assert_eq!(fixture.meter_commands().first().map(String::as_str), Some("VOLT"));
}

#[test]
fn test_failed_open_switches_supply_back_off() {
    let mut config = fast_config();
    config.instruments.power_supply = Some(supply_config(&["CH1", "CH2"]));
    let fixture = SimulatedFixture::from_config(&config.fixture, FixtureModel::default());
    fixture.reject_supply_command("OUTP CH2,ON");
    let mut bench = Bench::simulated(config, &fixture);

    assert!(matches!(bench.open(), Err(BenchError::Communication { .. })));

    let commands = fixture.supply_commands();
    let position = |cmd: &str| commands.iter().rposition(|c| c == cmd);
    let ch1_on = position("OUTP CH1,ON").expect("CH1 was powered before the failure");
    let ch1_off = position("OUTP CH1,OFF").expect("CH1 switched off");
    assert!(ch1_off > ch1_on, "{commands:?}");
    assert!(commands.contains(&"CH2:VOLT 0".to_string()));
    assert_eq!(fixture.voltage("Dev1/ao0"), Some(0.0));
}

#[test]
fn test_function_generator_programmed_on_open_and_disabled_on_close() {
    let mut config = fast_config();
    config.instruments.function_generator = Some(FunctionGeneratorConfig {
        serial: sim_serial(),
        square: SquareWave::default(),
        output_on_open: true,
    });
    let (mut bench, fixture) = open_bench(config, FixtureModel::default());

    assert_eq!(
        fixture.generator_commands(),
        vec!["*IDN?", "SOUR1:APPLy:SQU 1000,5,2.5", "OUTP1 ON"]
    );

    bench.close().unwrap();
    assert_eq!(
        fixture.generator_commands().last().map(String::as_str),
        Some("OUTP1 OFF")
    );
}
