//! Configuration loading and validation.

use std::path::Path;

use logic_bench::config::{BenchConfig, SweptInput};
use logic_bench::sweep::SweepDirection;
use logic_bench::validation::*;

fn sample_config_path() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config/bench.toml")
}

#[test]
fn test_sample_config_loads_and_validates() {
    let config = BenchConfig::load_from(sample_config_path()).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.sweep.swept_input, SweptInput::J);
    assert_eq!(config.sweep.direction, SweepDirection::Descending);
    assert_eq!(config.fixture.mux_lines.len(), 3);

    let dmm = config.instruments.multimeter.as_ref().unwrap();
    assert_eq!(dmm.serial.baud_rate, 9600);
    assert!(config.instruments.oscilloscope.is_some());
    assert!(config.instruments.power_supply.is_some());

    let generator = config.instruments.function_generator.as_ref().unwrap();
    assert_eq!(generator.square.frequency_hz, 1000.0);
    assert!(!generator.output_on_open);
}

#[test]
fn test_generator_frequency_must_be_positive() {
    let mut config = BenchConfig::load_from(sample_config_path()).unwrap();
    if let Some(generator) = config.instruments.function_generator.as_mut() {
        generator.square.frequency_hz = 0.0;
    }
    assert!(config.validate().unwrap_err().contains("frequency_hz"));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = BenchConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.reader.max_attempts, 5);
    assert!(config.instruments.multimeter.is_none());
}

#[test]
fn test_inverted_sweep_rejected() {
    let mut config = BenchConfig::default();
    config.sweep.start_volts = 2.0;
    config.sweep.stop_volts = 1.0;
    let err = config.validate().unwrap_err();
    assert!(err.contains("sweep range"), "{err}");
}

#[test]
fn test_zero_step_rejected() {
    let mut config = BenchConfig::default();
    config.sweep.step_volts = 0.0;
    assert!(config.validate().unwrap_err().contains("step_volts"));
}

#[test]
fn test_hold_outside_output_range_rejected() {
    let mut config = BenchConfig::default();
    config.sweep.hold_volts = 10.0;
    assert!(config.validate().unwrap_err().contains("hold_volts"));
}

#[test]
fn test_zero_attempts_rejected() {
    let mut config = BenchConfig::default();
    config.reader.max_attempts = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_helpers() {
    assert!(is_in_range(2.5, 0.0..=5.0).is_ok());
    assert!(is_in_range(5.5, 0.0..=5.0).is_err());
    assert!(is_ordered_bounds(0.0, 6.0).is_ok());
    assert!(is_ordered_bounds(6.0, 0.0).is_err());
    assert!(is_valid_channel_name("Dev1/ao0").is_ok());
    assert!(is_valid_channel_name("").is_err());
    assert!(is_not_empty("COM9").is_ok());
}

#[test]
fn test_step_yielding_too_many_points_rejected() {
    let mut config = BenchConfig::default();
    config.sweep.step_volts = 1e-12;
    assert!(config.validate().unwrap_err().contains("points"));

    config.sweep.step_volts = 0.01;
    assert!(config.validate().is_ok());
}
