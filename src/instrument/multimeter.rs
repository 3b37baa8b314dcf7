//! Fluke 45 digital multimeter.
//!
//! The meter answers `MEAS1?` with the primary display value, which on this bench
//! arrives printed twice back to back (`+3.400E+0+3.400E+0`). The first token is kept.

use std::time::Duration;
use tracing::debug;

use crate::error::BenchResult;
use crate::hardware::capabilities::InstrumentPort;
use crate::measurement::extract_scalar;
use crate::stimulus::wait;

/// Fluke 45 command layer; `function_settle` is waited after selecting a function.
pub struct Fluke45<P: InstrumentPort> {
    port: P,
    function_settle: Duration,
}

impl<P: InstrumentPort> Fluke45<P> {
    pub fn new(port: P, function_settle: Duration) -> Self {
        Self {
            port,
            function_settle,
        }
    }

    /// Select DC volts on the primary display and wait for the range to settle.
    pub fn configure(&mut self) -> BenchResult<()> {
        self.port.write("VOLT")?;
        wait(self.function_settle);
        Ok(())
    }

    /// One voltage round-trip, returning the extracted numeric token.
    ///
    /// `VAL1?` primes the display reading and its failure is ignored; `MEAS1?`
    /// carries the value.
    pub fn read_voltage(&mut self) -> BenchResult<String> {
        if let Err(e) = self.port.query("VAL1?") {
            debug!(instrument = self.port.id(), error = %e, "VAL1? failed, continuing");
        }
        let reply = self.port.query("MEAS1?")?;
        Ok(extract_scalar(&reply).to_string())
    }

    pub fn id(&self) -> &str {
        self.port.id()
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}
