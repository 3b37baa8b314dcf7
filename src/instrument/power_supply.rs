//! Siglent SPD3303 programmable DC supply.

use std::time::Duration;
use tracing::info;

use crate::error::BenchResult;
use crate::hardware::capabilities::InstrumentPort;
use crate::stimulus::wait;

/// Channel programming and output switching for an SPD3303.
pub struct Spd3303<P: InstrumentPort> {
    port: P,
}

impl<P: InstrumentPort> Spd3303<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Program voltage and current limit of one channel (`CH1`, `CH2`).
    pub fn set_channel(&mut self, channel: &str, volts: f64, amps: f64) -> BenchResult<()> {
        self.port.write(&format!("{channel}:VOLT {volts}"))?;
        self.port.write(&format!("{channel}:CURR {amps}"))
    }

    pub fn set_output(&mut self, channel: &str, on: bool) -> BenchResult<()> {
        let state = if on { "ON" } else { "OFF" };
        self.port.write(&format!("OUTP {channel},{state}"))
    }

    /// Zero the channel and switch it off.
    pub fn shutdown(&mut self, channel: &str) -> BenchResult<()> {
        self.port.write(&format!("{channel}:VOLT 0"))?;
        self.set_output(channel, false)
    }

    /// Switch every channel off, wait `off_time`, program them and switch them back on.
    ///
    /// Leaves the DUT freshly powered with its flip-flop in an undefined state; callers
    /// clear it afterwards.
    pub fn power_cycle(
        &mut self,
        channels: &[String],
        volts: f64,
        amps: f64,
        off_time: Duration,
    ) -> BenchResult<()> {
        for channel in channels {
            self.shutdown(channel)?;
        }
        wait(off_time);
        for channel in channels {
            self.set_channel(channel, volts, amps)?;
            self.set_output(channel, true)?;
        }
        info!(?channels, volts, amps, "Supply power-cycled");
        Ok(())
    }

    pub fn id(&self) -> &str {
        self.port.id()
    }
}
