use std::time::Duration;

use crate::{time, Interval, Timestamp};

const FPS_WINDOW: Interval = 1_000_000_000;

/// Wall-clock frame timing, advanced once per frame.
pub struct FrameClock {
    max_frame_time: Interval,

    last_time_point: Timestamp,
    elapsed: Interval,
    total_time: Interval,
    frame_count: u64,

    frames_this_second: u32,
    frames_per_second: u32,
    fps_counter: Interval,
}

impl FrameClock {
    pub fn new(max_frame_time: Duration) -> Self {
        Self::starting_at(max_frame_time, time::timestamp_now())
    }

    pub fn starting_at(max_frame_time: Duration, start: Timestamp) -> Self {
        Self {
            max_frame_time: time::interval_from_duration(max_frame_time),
            last_time_point: start,
            elapsed: 0,
            total_time: 0,
            frame_count: 0,
            frames_this_second: 0,
            frames_per_second: 0,
            fps_counter: 0,
        }
    }

    pub fn tick(&mut self) {
        self.tick_at(time::timestamp_now());
    }

    pub fn tick_at(&mut self, now: Timestamp) {
        // Clamp large gaps so a single hitch doesn't skew the totals.
        self.elapsed = now
            .saturating_sub(self.last_time_point)
            .min(self.max_frame_time);
        self.last_time_point = now;

        self.total_time = self.total_time.saturating_add(self.elapsed);
        self.frame_count += 1;
        self.frames_this_second += 1;

        self.fps_counter = self.fps_counter.saturating_add(self.elapsed);
        if self.fps_counter >= FPS_WINDOW {
            self.frames_per_second = self.frames_this_second;
            self.frames_this_second = 0;
            self.fps_counter %= FPS_WINDOW;
        }
    }

    /// Time between the last two ticks, clamped.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed)
    }

    pub fn total_time(&self) -> Duration {
        Duration::from_nanos(self.total_time)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames counted in the last completed one-second window.
    pub fn frames_per_second(&self) -> u32 {
        self.frames_per_second
    }
}
