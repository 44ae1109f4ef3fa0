use std::thread;
use std::time::Duration;

use crate::backend::{DisjointData, TimestampBackend};
use crate::error::{Error, Result};
use crate::time;

/// Blocking query readback.
///
/// Results are expected to be ready by the time they are read (frame pacing plus optional
/// double buffering), so this is a tight poll with a yield in between, not a backoff.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Readback {
    timeout: Option<Duration>,
}

impl Readback {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn wait<T>(&self, mut poll: impl FnMut() -> Option<T>) -> Result<T> {
        if let Some(v) = poll() {
            return Ok(v);
        }

        let begin = time::timestamp_now();
        loop {
            thread::yield_now();
            if let Some(v) = poll() {
                return Ok(v);
            }
            if let Some(timeout) = self.timeout {
                let waited = Duration::from_nanos(time::timestamp_now().saturating_sub(begin));
                if waited >= timeout {
                    return Err(Error::ReadbackTimeout { waited });
                }
            }
        }
    }

    pub fn disjoint<B: TimestampBackend>(
        &self,
        backend: &mut B,
        query: &B::Query,
    ) -> Result<DisjointData> {
        self.wait(|| backend.poll_disjoint(query))
    }

    pub fn timestamp<B: TimestampBackend>(&self, backend: &mut B, query: &B::Query) -> Result<u64> {
        self.wait(|| backend.poll_timestamp(query))
    }
}
