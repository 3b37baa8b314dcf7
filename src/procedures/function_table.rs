//! Function table: Q after clocking each CLR/J/K combination.

use serde::Serialize;
use std::fmt;
use tracing::{debug, info_span};

use super::{set_inputs, with_teardown};
use crate::config::{FixtureConfig, TimingConfig};
use crate::error::BenchResult;
use crate::measurement::Reading;
use crate::stimulus::{wait, StimulusController};
use crate::sweep::LogicLevel;

/// One row of stimulus. `None` inputs are don't-care and driven at 0 V.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FunctionTableRow {
    /// Level on the CLR pin; `false` asserts the active-low clear
    pub clear: bool,
    pub j: Option<f64>,
    pub k: Option<f64>,
}

impl FunctionTableRow {
    /// Clear asserted, J/K don't-care, then the four J/K combinations.
    pub fn standard(logic_high: f64) -> Vec<Self> {
        let row = |clear, j, k| Self { clear, j, k };
        vec![
            row(false, None, None),
            row(true, Some(0.0), Some(0.0)),
            row(true, Some(logic_high), Some(0.0)),
            row(true, Some(0.0), Some(logic_high)),
            row(true, Some(logic_high), Some(logic_high)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTableEntry {
    pub row: FunctionTableRow,
    pub reading: Reading,
    pub label: LogicLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTable {
    pub entries: Vec<FunctionTableEntry>,
}

impl FunctionTable {
    pub fn labels(&self) -> Vec<LogicLevel> {
        self.entries.iter().map(|e| e.label).collect()
    }
}

impl fmt::Display for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn input(v: Option<f64>) -> String {
            v.map_or_else(|| "X".to_string(), |v| format!("{v:.1}"))
        }
        writeln!(f, "{:>4} {:>5} {:>5} {:>9}  Q", "CLR", "J", "K", "Q (V)")?;
        for e in &self.entries {
            let measured = e
                .reading
                .value()
                .map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
            writeln!(
                f,
                "{:>4} {:>5} {:>5} {:>9}  {}",
                u8::from(e.row.clear),
                input(e.row.j),
                input(e.row.k),
                measured,
                e.label
            )?;
        }
        Ok(())
    }
}

/// Clock every row in order and classify Q.
pub fn run_function_table<F>(
    stimulus: &mut StimulusController,
    fixture: &FixtureConfig,
    timing: &TimingConfig,
    logic_threshold: f64,
    rows: &[FunctionTableRow],
    mut measure: F,
) -> BenchResult<FunctionTable>
where
    F: FnMut() -> Reading,
{
    let span = info_span!("function_table", rows = rows.len());
    let _enter = span.enter();

    let clock = fixture.clock.to_spec();
    with_teardown(stimulus, fixture, |stimulus| {
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            stimulus.set_line(&fixture.clear.line, row.clear)?;
            set_inputs(
                stimulus,
                fixture,
                row.j.unwrap_or(0.0),
                row.k.unwrap_or(0.0),
            )?;
            wait(timing.settle());
            stimulus.pulse(&clock)?;
            wait(timing.latch_delay());

            let reading = measure();
            let label = LogicLevel::classify(&reading, logic_threshold);
            debug!(?row, %reading, %label, "Function table row");
            entries.push(FunctionTableEntry {
                row: *row,
                reading,
                label,
            });
        }
        Ok(FunctionTable { entries })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_rows() {
        let rows = FunctionTableRow::standard(5.0);
        assert_eq!(rows.len(), 5);
        assert!(!rows[0].clear);
        assert_eq!(rows[0].j, None);
        assert_eq!(rows[4].j, Some(5.0));
        assert_eq!(rows[4].k, Some(5.0));
    }

    #[test]
    fn display_marks_dont_care() {
        let table = FunctionTable {
            entries: vec![FunctionTableEntry {
                row: FunctionTableRow {
                    clear: false,
                    j: None,
                    k: None,
                },
                reading: Reading::Valid {
                    value: 0.2,
                    attempts: 1,
                },
                label: LogicLevel::Low,
            }],
        };
        let text = table.to_string();
        assert!(text.lines().nth(1).unwrap().contains('X'));
        assert!(text.trim_end().ends_with('L'));
    }
}
