use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`GpuProfiler`](crate::GpuProfiler).
///
/// Invalid cycles and noise-floor pass durations are routine and are absorbed internally;
/// they never show up here.
#[derive(Debug, Error)]
pub enum Error {
    /// `start_profiling` was called with zero passes.
    #[error("pass count must be positive")]
    InvalidPassCount,

    /// `start_profiling` was called with a zero flush interval.
    #[error("flush interval must be non-zero")]
    InvalidFlushInterval,

    /// The backend failed to create a query object for a slot.
    #[error("failed to create timestamp query: {0}")]
    QueryCreation(#[source] BoxError),

    /// A query result did not become available in time. Usually means the device was lost
    /// or hung.
    #[error("query result not ready after {waited:?}")]
    ReadbackTimeout { waited: Duration },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
