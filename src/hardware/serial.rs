//! Serial-line instrument transport.
//!
//! Commands are written with a terminator appended; replies are read until the
//! response terminator arrives or the timeout expires. A reply that never arrives is
//! a [`BenchError::Timeout`], so the validated reader can retry it.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config::SerialSettings;
use crate::error::{BenchError, BenchResult};
use crate::hardware::capabilities::InstrumentPort;

/// One instrument on one serial port.
pub struct SerialInstrument {
    id: String,
    port: Box<dyn SerialPort>,
    write_terminator: String,
    read_terminator: char,
    timeout: Duration,
}

impl SerialInstrument {
    /// Open the port described by `settings`.
    pub fn open(id: impl Into<String>, settings: &SerialSettings) -> BenchResult<Self> {
        let id = id.into();
        // Short OS-level timeout; the reply loop enforces the real one.
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(Duration::from_millis(50))
            .open()?;
        debug!(
            instrument = %id,
            port = %settings.port,
            baud = settings.baud_rate,
            "Opened serial instrument"
        );
        Ok(Self::with_port(id, port, settings))
    }

    /// Wrap an already opened port, framing commands as `settings` describes.
    pub fn with_port(
        id: impl Into<String>,
        port: Box<dyn SerialPort>,
        settings: &SerialSettings,
    ) -> Self {
        Self {
            id: id.into(),
            port,
            write_terminator: settings.write_terminator.clone(),
            read_terminator: settings.read_terminator,
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }

    fn send(&mut self, command: &str) -> BenchResult<()> {
        let framed = format!("{}{}", command, self.write_terminator);
        trace!(instrument = %self.id, command = %framed.escape_default(), "Sending");
        self.port
            .write_all(framed.as_bytes())
            .and_then(|()| self.port.flush())
            .map_err(|e| BenchError::communication(&self.id, format!("write failed: {e}")))
    }

    fn read_reply(&mut self) -> BenchResult<String> {
        let mut buffer = [0u8; 1024];
        let mut response = String::new();
        let start = Instant::now();

        while start.elapsed() < self.timeout {
            if let Ok(n) = self.port.read(&mut buffer) {
                if n > 0 {
                    response.push_str(&String::from_utf8_lossy(&buffer[..n]));
                    if response.contains(self.read_terminator) {
                        trace!(instrument = %self.id, reply = %response.escape_default(), "Received");
                        return Ok(response.trim().to_string());
                    }
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        if response.trim().is_empty() {
            Err(BenchError::Timeout {
                instrument: self.id.clone(),
                timeout: self.timeout,
            })
        } else {
            // partial line: hand it to the caller, the parser decides
            Ok(response.trim().to_string())
        }
    }
}

impl InstrumentPort for SerialInstrument {
    fn id(&self) -> &str {
        &self.id
    }

    fn write(&mut self, command: &str) -> BenchResult<()> {
        self.send(command)
    }

    fn query(&mut self, command: &str) -> BenchResult<String> {
        // drop anything left over from an earlier timed-out reply
        if let Err(e) = self.port.clear(serialport::ClearBuffer::Input) {
            debug!(instrument = %self.id, error = %e, "Input buffer clear failed");
        }
        self.send(command)?;
        self.read_reply()
    }

    fn set_timeout(&mut self, timeout: Duration) -> BenchResult<()> {
        self.timeout = timeout;
        Ok(())
    }
}
