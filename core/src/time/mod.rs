//! Monotonic host clock in nanoseconds.

#[cfg_attr(unix, path = "unix.rs")]
#[cfg_attr(windows, path = "windows.rs")]
mod platform;

pub use platform::*;

use std::time::Duration;

use crate::Interval;

/// Whole nanoseconds in `d`, saturating at [`Interval::MAX`] (about 584 years).
pub(crate) fn interval_from_duration(d: Duration) -> Interval {
    Interval::try_from(d.as_nanos()).unwrap_or(Interval::MAX)
}
