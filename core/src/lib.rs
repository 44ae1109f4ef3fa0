//! Frame-rate and per-stage GPU timing for real-time capture/render/present pipelines.
//!
//! GPU timestamps are collected into one or two reusable query slots and read back a frame
//! later, so the render thread normally never waits on the GPU.

pub use aggregate::{GpuTimings, TimingsHandle};
pub use backend::{DisjointData, TimestampBackend};
pub use clock::FrameClock;
pub use config::{Config, LatencyMode, LatencyModeSwitch};
pub use error::{BoxError, Error, Result};
pub use profiler::GpuProfiler;

mod aggregate;
mod backend;
mod clock;
mod config;
mod error;
#[cfg(test)]
mod fake;
mod profiler;
mod query;
mod readback;
mod session;
pub mod time;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub type Timestamp = u64;
pub type Interval = u64;
