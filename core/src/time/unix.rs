use crate::Timestamp;
use nix::sys::time::TimeValLike;
use nix::time::{clock_gettime, ClockId};

pub fn timestamp_now() -> Timestamp {
    // CLOCK_MONOTONIC cannot fail on any kernel nix supports.
    clock_gettime(ClockId::CLOCK_MONOTONIC)
        .map(|ts| ts.num_nanoseconds() as _)
        .unwrap_or(0)
}
