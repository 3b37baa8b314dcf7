//! Bounded-retry validated reads.
//!
//! An instrument round-trip can fail outright, return text that is not a number, or
//! return a number that is physically implausible for the node being measured (a
//! meter still auto-ranging, a stale buffer). All three are treated the same way:
//! wait, try again, give up after a fixed number of attempts and report what the
//! last attempt saw. Nothing here returns `Err`; exhaustion is a [`Reading::Failed`].

use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::{parse_scalar, LastReply, Reading};
use crate::config::ReaderConfig;
use crate::error::BenchResult;

/// Acceptance window and attempt limit for one kind of reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadBounds {
    pub min: f64,
    pub max: f64,
    pub max_attempts: u32,
}

impl From<&ReaderConfig> for ReadBounds {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            min: config.min_volts,
            max: config.max_volts,
            max_attempts: config.max_attempts,
        }
    }
}

/// Retry protocol around a single-shot read function.
#[derive(Debug, Clone)]
pub struct ValidatedReader {
    retry_delay: Duration,
}

impl ValidatedReader {
    /// Reader that waits `retry_delay` between failed attempts.
    pub fn new(retry_delay: Duration) -> Self {
        Self { retry_delay }
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Read until a reply parses into `[min, max]`, at most `max_attempts` times.
    ///
    /// `read_fn` performs one round-trip; `Err` means the instrument did not answer.
    /// Waits `retry_delay` between attempts but not after the last one.
    pub fn read<F>(&self, mut read_fn: F, min: f64, max: f64, max_attempts: u32) -> Reading
    where
        F: FnMut() -> BenchResult<String>,
    {
        let mut last = LastReply::NoReply;

        for attempt in 1..=max_attempts {
            last = match read_fn() {
                Ok(raw) => match parse_scalar(&raw) {
                    Some(value) if (min..=max).contains(&value) => {
                        debug!(attempt, value, "Reading accepted");
                        return Reading::Valid {
                            value,
                            attempts: attempt,
                        };
                    }
                    Some(value) => {
                        warn!(attempt, max_attempts, value, min, max, "Reading out of range");
                        LastReply::OutOfRange(value)
                    }
                    None => {
                        warn!(attempt, max_attempts, reply = %raw.trim(), "Unparsable reading");
                        LastReply::Unparsable(raw.trim().to_string())
                    }
                },
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Read failed");
                    LastReply::NoReply
                }
            };

            if attempt < max_attempts && !self.retry_delay.is_zero() {
                thread::sleep(self.retry_delay);
            }
        }

        Reading::Failed {
            last,
            attempts: max_attempts,
        }
    }

    /// [`read`](Self::read) with the window and attempt limit taken from `bounds`.
    pub fn read_bounded<F>(&self, read_fn: F, bounds: &ReadBounds) -> Reading
    where
        F: FnMut() -> BenchResult<String>,
    {
        self.read(read_fn, bounds.min, bounds.max, bounds.max_attempts)
    }
}

impl Default for ValidatedReader {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
