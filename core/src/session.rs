use std::time::Duration;

use crate::error::{Error, Result};
use crate::time::interval_from_duration;
use crate::Interval;

/// Profiling on/off state plus the flush timer.
#[derive(Clone, Debug, Default)]
pub(crate) struct ProfilingSession {
    active: bool,
    pass_count: usize,
    flush_interval: Interval,
    since_flush: Interval,
}

impl ProfilingSession {
    pub fn start(&mut self, flush_interval: Duration, pass_count: usize) -> Result<()> {
        if pass_count == 0 {
            return Err(Error::InvalidPassCount);
        }
        let flush_interval = interval_from_duration(flush_interval);
        if flush_interval == 0 {
            return Err(Error::InvalidFlushInterval);
        }
        *self = Self {
            active: true,
            pass_count,
            flush_interval,
            since_flush: 0,
        };
        Ok(())
    }

    pub fn stop(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pass_count(&self) -> usize {
        self.pass_count
    }

    /// Advance the flush timer. Returns true when an interval has completed; the overshoot
    /// is carried into the next interval.
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        if !self.active {
            return false;
        }
        self.since_flush = self
            .since_flush
            .saturating_add(interval_from_duration(elapsed));
        if self.since_flush >= self.flush_interval {
            self.since_flush %= self.flush_interval;
            true
        } else {
            false
        }
    }
}
