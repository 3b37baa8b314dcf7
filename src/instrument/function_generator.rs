//! GW Instek AFG-2005 function generator.
//!
//! Channel 1 can supply a free-running square-wave clock. The DAQ clock line drives
//! the fixture during the procedures, so the generator is normally programmed and
//! left with its output off.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BenchError, BenchResult};
use crate::hardware::capabilities::InstrumentPort;
use crate::instrument::parse_f64_response;

/// Square wave on channel 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquareWave {
    pub frequency_hz: f64,
    /// Peak-to-peak amplitude
    pub amplitude_vpp: f64,
    pub offset_volts: f64,
}

impl Default for SquareWave {
    /// 1 kHz, 0 V to 5 V.
    fn default() -> Self {
        Self {
            frequency_hz: 1000.0,
            amplitude_vpp: 5.0,
            offset_volts: 2.5,
        }
    }
}

/// Settings read back from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeneratorState {
    pub wave: SquareWave,
    pub output_on: bool,
}

/// Command layer for an AFG-2005 on any instrument port.
pub struct Afg2005<P: InstrumentPort> {
    port: P,
}

impl<P: InstrumentPort> Afg2005<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Query `*IDN?` and check the reply names an AFG-2005.
    pub fn identify(&mut self) -> BenchResult<String> {
        let idn = self.port.query("*IDN?")?;
        let upper = idn.to_uppercase();
        if upper.contains("GW INSTEK") && upper.contains("AFG-2005") {
            Ok(idn.trim().to_string())
        } else {
            Err(BenchError::communication(
                self.port.id(),
                format!("unexpected identity '{}'", idn.trim()),
            ))
        }
    }

    pub fn apply_square(&mut self, wave: &SquareWave) -> BenchResult<()> {
        self.port.write(&format!(
            "SOUR1:APPLy:SQU {},{},{}",
            wave.frequency_hz, wave.amplitude_vpp, wave.offset_volts
        ))?;
        info!(
            frequency_hz = wave.frequency_hz,
            amplitude_vpp = wave.amplitude_vpp,
            offset_volts = wave.offset_volts,
            "Generator square wave applied"
        );
        Ok(())
    }

    pub fn set_output(&mut self, on: bool) -> BenchResult<()> {
        self.port
            .write(if on { "OUTP1 ON" } else { "OUTP1 OFF" })
    }

    /// Read back frequency, amplitude, offset and output state.
    pub fn state(&mut self) -> BenchResult<GeneratorState> {
        let id = self.port.id().to_string();
        let frequency_hz = parse_f64_response(&id, &self.port.query("SOUR1:FREQ?")?)?;
        let amplitude_vpp = parse_f64_response(&id, &self.port.query("SOUR1:VOLT?")?)?;
        let offset_volts = parse_f64_response(&id, &self.port.query("SOUR1:VOLT:OFFS?")?)?;
        let output = self.port.query("OUTP1?")?;
        let output_on = match output.trim().to_uppercase().as_str() {
            "1" | "ON" => true,
            "0" | "OFF" => false,
            other => {
                return Err(BenchError::MalformedReply {
                    instrument: id,
                    reply: other.to_string(),
                })
            }
        };
        Ok(GeneratorState {
            wave: SquareWave {
                frequency_hz,
                amplitude_vpp,
                offset_volts,
            },
            output_on,
        })
    }

    pub fn id(&self) -> &str {
        self.port.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::ScriptedPort;

    #[test]
    fn programs_default_square_wave() {
        let port = ScriptedPort::new("generator");
        let log = port.log();
        let mut afg = Afg2005::new(port);
        afg.apply_square(&SquareWave::default()).unwrap();
        afg.set_output(true).unwrap();
        afg.set_output(false).unwrap();
        assert_eq!(
            *log.lock(),
            vec!["SOUR1:APPLy:SQU 1000,5,2.5", "OUTP1 ON", "OUTP1 OFF"]
        );
    }

    #[test]
    fn identity_must_name_the_model() {
        let port = ScriptedPort::new("generator").respond("*IDN?", "GW INSTEK,AFG-2005,SN123,V1.02\r");
        let mut afg = Afg2005::new(port);
        assert_eq!(afg.identify().unwrap(), "GW INSTEK,AFG-2005,SN123,V1.02");

        let port = ScriptedPort::new("generator").respond("*IDN?", "Siglent,SPD3303X-E");
        let mut afg = Afg2005::new(port);
        assert!(matches!(
            afg.identify(),
            Err(BenchError::Communication { .. })
        ));
    }

    #[test]
    fn state_reads_back_settings() {
        let port = ScriptedPort::new("generator")
            .respond("SOUR1:FREQ?", "+1.000000E+03")
            .respond("SOUR1:VOLT?", "+5.000E+00")
            .respond("SOUR1:VOLT:OFFS?", "+2.500E+00")
            .respond("OUTP1?", "1");
        let mut afg = Afg2005::new(port);
        let state = afg.state().unwrap();
        assert_eq!(state.wave, SquareWave::default());
        assert!(state.output_on);
    }

    #[test]
    fn garbled_output_state_is_malformed() {
        let port = ScriptedPort::new("generator")
            .respond("SOUR1:FREQ?", "1000")
            .respond("SOUR1:VOLT?", "5")
            .respond("SOUR1:VOLT:OFFS?", "2.5")
            .respond("OUTP1?", "maybe");
        let mut afg = Afg2005::new(port);
        assert!(matches!(
            afg.state(),
            Err(BenchError::MalformedReply { .. })
        ));
    }
}
