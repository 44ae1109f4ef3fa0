use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Trade-off between reporting latency and the risk of waiting on the GPU during readback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum LatencyMode {
    /// One query slot, read and rewritten in the same frame.
    #[default]
    LowLatency,
    /// Two query slots in ping-pong; results lag one extra frame but are always complete.
    AvoidStalls,
}

impl LatencyMode {
    pub fn slot_count(self) -> usize {
        match self {
            LatencyMode::LowLatency => 1,
            LatencyMode::AvoidStalls => 2,
        }
    }
}

/// Shared, cloneable switch for [`LatencyMode`].
///
/// The configuration owner keeps a clone and may flip it at any time; the profiler re-reads
/// it on every frame.
#[derive(Clone, Debug, Default)]
pub struct LatencyModeSwitch {
    avoid_stalls: Arc<AtomicBool>,
}

impl LatencyModeSwitch {
    pub fn new(mode: LatencyMode) -> Self {
        Self {
            avoid_stalls: Arc::new(AtomicBool::new(mode == LatencyMode::AvoidStalls)),
        }
    }

    pub fn get(&self) -> LatencyMode {
        if self.avoid_stalls.load(Ordering::Relaxed) {
            LatencyMode::AvoidStalls
        } else {
            LatencyMode::LowLatency
        }
    }

    pub fn set(&self, mode: LatencyMode) {
        self.avoid_stalls
            .store(mode == LatencyMode::AvoidStalls, Ordering::Relaxed);
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Upper bound on how long a single query readback may spin. `None` waits forever.
    pub readback_timeout: Option<Duration>,
    /// Pass durations at or below this many milliseconds are discarded as artifacts.
    pub noise_floor_ms: f64,
    /// Per-frame elapsed time is clamped to this to absorb hitches.
    pub max_frame_time: Duration,
    /// Initial buffering mode.
    pub latency_mode: LatencyMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            readback_timeout: Some(Duration::from_secs(1)),
            noise_floor_ms: 0.01,
            max_frame_time: Duration::from_millis(100),
            latency_mode: LatencyMode::LowLatency,
        }
    }
}
