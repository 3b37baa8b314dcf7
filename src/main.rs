//! CLI Entry Point for logic-bench
//!
//! Runs one characterization procedure against the flip-flop fixture and prints the
//! result as a text table or, with `--json`, as JSON on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! logic-bench --simulate sweep --direction ascending
//! logic-bench --config config/bench.toml --json delay --edge lh
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

use logic_bench::config::BenchConfig;
use logic_bench::hardware::mock::{FixtureModel, SimulatedFixture};
use logic_bench::sweep::SweepDirection;
use logic_bench::waveform::DelayMode;
use logic_bench::{logging, Bench, BenchError};

#[derive(Parser)]
#[command(name = "logic-bench")]
#[command(about = "JK flip-flop bench characterization", long_about = None)]
struct Cli {
    /// Configuration file (TOML); environment overrides use the LOGIC_BENCH_ prefix
    #[arg(long, global = true, default_value = "config/bench.toml")]
    config: PathBuf,

    /// Run against the simulated fixture instead of hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Threshold sweep of the configured input
    Sweep {
        /// Override the configured direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
    },
    /// Ascending and descending sweeps, with the hysteresis between them
    Hysteresis,
    /// Q for each CLR/J/K combination
    FunctionTable,
    /// Supply current (ICC) and low-level input current (IIL)
    Currents,
    /// Clock-to-Q propagation delay
    Delay {
        #[arg(long, value_enum, default_value = "hl")]
        edge: EdgeArg,
    },
    /// Setup-time pass/fail test
    SetupTime,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Ascending,
    Descending,
}

impl From<DirectionArg> for SweepDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Ascending => SweepDirection::Ascending,
            DirectionArg::Descending => SweepDirection::Descending,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EdgeArg {
    /// Output falls (tPHL)
    Hl,
    /// Output rises (tPLH)
    Lh,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BenchConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config
        .validate()
        .map_err(BenchError::Configuration)
        .context("Invalid configuration")?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let mut bench = build_bench(config, cli.simulate)?;
    let outcome = bench
        .open()
        .context("Failed to open bench")
        .and_then(|()| run(&mut bench, &cli.command, cli.json));
    let closed = bench.close();

    outcome?;
    closed.context("Failed to close bench")?;
    Ok(())
}

fn build_bench(config: BenchConfig, simulate: bool) -> Result<Bench> {
    if simulate {
        let fixture = SimulatedFixture::from_config(&config.fixture, FixtureModel::default());
        return Ok(Bench::simulated(config, &fixture));
    }
    // No DAQ output driver ships with this crate; hardware runs embed the library
    // and pass their own StimulusController to Bench::connect.
    Err(BenchError::FeatureNotEnabled("DAQ output driver (use --simulate)".to_string()).into())
}

fn run(bench: &mut Bench, command: &Commands, json: bool) -> Result<()> {
    match command {
        Commands::Sweep { direction } => {
            let result = match direction {
                Some(d) => {
                    let plan = bench.sweep_plan((*d).into());
                    bench.run_plan(&plan)?
                }
                None => bench.sweep()?,
            };
            emit(json, &result, || result.to_string())
        }
        Commands::Hysteresis => {
            let report = bench.hysteresis()?;
            emit(json, &report, || {
                let summary = match report.hysteresis {
                    Some(h) => format!(
                        "rising {:.3} V, falling {:.3} V, hysteresis {:.3} V",
                        h.rising, h.falling, h.width
                    ),
                    None => "no transition found".to_string(),
                };
                format!("{}\n{}\n{}", report.ascending, report.descending, summary)
            })
        }
        Commands::FunctionTable => {
            let table = bench.function_table()?;
            emit(json, &table, || table.to_string())
        }
        Commands::Currents => {
            let currents = bench.supply_currents()?;
            emit(json, &currents, || {
                currents
                    .iter()
                    .map(|c| match c.current {
                        Some(i) => format!("{}: {:.3} mA", c.name, i * 1e3),
                        None => format!("{}: undefined ({} / {})", c.name, c.reference, c.loaded),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Delay { edge } => {
            let mode = match edge {
                EdgeArg::Hl => DelayMode::HighToLow,
                EdgeArg::Lh => DelayMode::LowToHigh,
            };
            let measurement = bench.propagation_delay(mode)?;
            emit(json, &measurement.delay, || match measurement.delay.delay {
                Some(d) => format!("{:?}: {:.2} ns", mode, d * 1e9),
                None => format!("{mode:?}: undefined (crossing not found)"),
            })
        }
        Commands::SetupTime => {
            let result = bench.setup_time()?;
            emit(json, &result, || {
                result
                    .trials
                    .iter()
                    .map(|t| {
                        format!(
                            "{:>6} ns  {}",
                            t.setup_time.as_nanos(),
                            if t.passed { "PASS" } else { "FAIL" }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text().trim_end());
    }
    Ok(())
}
