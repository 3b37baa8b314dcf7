//! Tektronix TDS-style digital storage oscilloscope.
//!
//! Waveforms are transferred as ASCII curve data and scaled with the `WFMPRE`
//! preamble of the selected source:
//!
//! - `v = (raw - YOFF) * YMULT + YZERO`
//! - `t = i * XINCR + XZERO`

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parse_f64_response;
use crate::error::{BenchError, BenchResult};
use crate::hardware::capabilities::{InstrumentPort, WaveformCapture};
use crate::waveform::Waveform;

/// Trigger edge slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSlope {
    Rise,
    Fall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    Auto,
    Normal,
}

/// Front-panel state applied before a delay measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSetup {
    /// Seconds per division
    pub horizontal_scale: f64,
    /// Trigger point position, seconds
    pub horizontal_position: f64,
    /// Channels to configure
    pub channels: Vec<u8>,
    /// Volts per division, every configured channel
    pub channel_scale: f64,
    /// Vertical position in divisions
    pub channel_position: f64,
    pub trigger_mode: TriggerMode,
    pub trigger_slope: TriggerSlope,
    pub trigger_source: u8,
    /// Trigger level in volts; the scope's current level when unset
    pub trigger_level: Option<f64>,
}

impl Default for ScopeSetup {
    fn default() -> Self {
        Self {
            horizontal_scale: 10e-9,
            horizontal_position: 20e-9,
            channels: vec![1, 2],
            channel_scale: 1.0,
            channel_position: -3.0,
            trigger_mode: TriggerMode::Normal,
            trigger_slope: TriggerSlope::Fall,
            trigger_source: 1,
            trigger_level: None,
        }
    }
}

impl ScopeSetup {
    fn commands(&self) -> Vec<String> {
        let mut commands = vec![
            format!("HORizontal:MAIn:SCAle {:E}", self.horizontal_scale),
            format!("HORizontal:POSition {:E}", self.horizontal_position),
        ];
        for ch in &self.channels {
            commands.push(format!("CH{ch}:SCAle {}", self.channel_scale));
            commands.push(format!("CH{ch}:POSition {}", self.channel_position));
        }
        commands.push(format!(
            "TRIGger:MAIn:MODe {}",
            match self.trigger_mode {
                TriggerMode::Auto => "AUTO",
                TriggerMode::Normal => "NORMal",
            }
        ));
        commands.push(format!(
            "TRIGger:MAIn:EDGE:SLOpe {}",
            match self.trigger_slope {
                TriggerSlope::Rise => "RISe",
                TriggerSlope::Fall => "FALL",
            }
        ));
        commands.push(format!("TRIGger:MAIn:EDGE:SOUrce CH{}", self.trigger_source));
        if let Some(level) = self.trigger_level {
            commands.push(format!("TRIGger:MAIn:LEVel {level}"));
        }
        commands
    }
}

/// Scaling coefficients read from `WFMPRE`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Preamble {
    x_increment: f64,
    x_zero: f64,
    y_mult: f64,
    y_zero: f64,
    y_offset: f64,
}

/// Tektronix scope driven over an instrument port; captures are ASCII `CURVe?`
/// transfers scaled by the WFMPRE preamble.
pub struct TekScope<P: InstrumentPort> {
    port: P,
    record_length: usize,
}

impl<P: InstrumentPort> TekScope<P> {
    pub fn new(port: P, record_length: usize) -> Self {
        Self {
            port,
            record_length,
        }
    }

    /// Write every setting in `setup`.
    pub fn apply(&mut self, setup: &ScopeSetup) -> BenchResult<()> {
        for command in setup.commands() {
            self.port.write(&command)?;
        }
        debug!(instrument = self.port.id(), ?setup, "Scope configured");
        Ok(())
    }

    fn query_f64(&mut self, command: &str) -> BenchResult<f64> {
        let reply = self.port.query(command)?;
        parse_f64_response(self.port.id(), &reply)
    }

    fn preamble(&mut self) -> BenchResult<Preamble> {
        Ok(Preamble {
            x_increment: self.query_f64("WFMPRE:XINcr?")?,
            x_zero: self.query_f64("WFMPRE:XZERO?")?,
            y_mult: self.query_f64("WFMPRE:YMUlt?")?,
            y_zero: self.query_f64("WFMPRE:YZEro?")?,
            y_offset: self.query_f64("WFMPRE:YOFF?")?,
        })
    }

    fn curve(&mut self) -> BenchResult<Vec<f64>> {
        let reply = self.port.query("CURVe?")?;
        // tolerate a `:CURVE ` header when the scope has HEADer ON
        let body = reply
            .trim()
            .trim_start_matches(|c: char| c == ':' || c.is_ascii_alphabetic())
            .trim();
        if body.is_empty() {
            return Ok(Vec::new());
        }
        body.split(',')
            .map(|token| {
                token
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| BenchError::MalformedReply {
                        instrument: self.port.id().to_string(),
                        reply: format!("curve point '{}'", token.trim()),
                    })
            })
            .collect()
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}

impl<P: InstrumentPort> WaveformCapture for TekScope<P> {
    fn capture(&mut self, channel: u8) -> BenchResult<Waveform> {
        self.port.write(&format!("DATa:SOUrce CH{channel}"))?;
        self.port.write("DATa:ENCdg ASCIi")?;
        self.port.write("DATa:WIDth 2")?;
        self.port.write("DATa:STARt 1")?;
        self.port.write(&format!("DATa:STOP {}", self.record_length))?;

        let pre = self.preamble()?;
        let raw = self.curve()?;

        let volts: Vec<f64> = raw
            .iter()
            .map(|r| (r - pre.y_offset) * pre.y_mult + pre.y_zero)
            .collect();
        let times: Vec<f64> = (0..volts.len())
            .map(|i| i as f64 * pre.x_increment + pre.x_zero)
            .collect();

        debug!(channel, samples = volts.len(), "Waveform captured");
        Waveform::new(format!("CH{channel}"), times, volts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::ScriptedPort;

    fn scripted(curve: &str) -> ScriptedPort {
        ScriptedPort::new("scope")
            .respond("WFMPRE:XINcr?", "1.0E-9")
            .respond("WFMPRE:XZERO?", "-2.0E-9")
            .respond("WFMPRE:YMUlt?", "0.5")
            .respond("WFMPRE:YZEro?", "0.0")
            .respond("WFMPRE:YOFF?", "10")
            .respond("CURVe?", curve)
    }

    #[test]
    fn capture_scales_raw_points() {
        let port = scripted("10,12,20");
        let log = port.log();
        let mut scope = TekScope::new(port, 3);
        let wf = scope.capture(2).unwrap();

        assert_eq!(wf.channel(), "CH2");
        assert_eq!(wf.volts(), &[0.0, 1.0, 5.0]);
        assert!((wf.times()[0] + 2.0e-9).abs() < 1e-18);
        assert!((wf.times()[2] - 0.0).abs() < 1e-18);

        let log = log.lock();
        assert_eq!(log[0], "DATa:SOUrce CH2");
        assert_eq!(log[4], "DATa:STOP 3");
    }

    #[test]
    fn capture_accepts_header_prefix() {
        let mut scope = TekScope::new(scripted(":CURVE 10,10"), 2);
        assert_eq!(scope.capture(1).unwrap().len(), 2);
    }

    #[test]
    fn bad_curve_point_is_malformed() {
        let mut scope = TekScope::new(scripted("10,x,12"), 3);
        assert!(matches!(
            scope.capture(1),
            Err(BenchError::MalformedReply { .. })
        ));
    }

    #[test]
    fn bad_preamble_is_malformed() {
        let port = ScriptedPort::new("scope").respond("WFMPRE:XINcr?", "?");
        let mut scope = TekScope::new(port, 10);
        assert!(matches!(
            scope.capture(1),
            Err(BenchError::MalformedReply { .. })
        ));
    }

    #[test]
    fn setup_commands() {
        let port = ScriptedPort::new("scope");
        let log = port.log();
        let mut scope = TekScope::new(port, 10);
        scope.apply(&ScopeSetup::default()).unwrap();
        let log = log.lock();
        assert_eq!(log[0], "HORizontal:MAIn:SCAle 1E-8");
        assert!(log.contains(&"CH2:POSition -3".to_string()));
        assert!(log.contains(&"TRIGger:MAIn:EDGE:SLOpe FALL".to_string()));
        assert_eq!(log.last().unwrap(), "TRIGger:MAIn:EDGE:SOUrce CH1");
    }
}
