use std::time::Duration;

use tracing::{error, info};

use crate::aggregate::{GpuTimings, TimingAggregator, TimingsHandle};
use crate::backend::TimestampBackend;
use crate::clock::FrameClock;
use crate::config::{Config, LatencyModeSwitch};
use crate::error::Result;
use crate::query::QuerySlotPool;
use crate::readback::Readback;
use crate::session::ProfilingSession;

/// Frame-rate and per-stage GPU timing for a capture → passes → overlay pipeline.
///
/// The render loop calls [`on_begin_frame`](Self::on_begin_frame) once per frame, then the
/// stage hooks in pipeline order, ending with [`on_end_overlay`](Self::on_end_overlay). The
/// backend is passed into every call; `Q` is its query handle type.
pub struct GpuProfiler<Q> {
    clock: FrameClock,
    session: ProfilingSession,
    pool: Option<QuerySlotPool<Q>>,
    aggregator: TimingAggregator,
    readback: Readback,
    latency: LatencyModeSwitch,
    timings: TimingsHandle,
}

impl<Q> GpuProfiler<Q> {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, FrameClock::new(config.max_frame_time))
    }

    pub fn with_clock(config: Config, clock: FrameClock) -> Self {
        let timings = TimingsHandle::default();
        Self {
            clock,
            session: ProfilingSession::default(),
            pool: None,
            aggregator: TimingAggregator::new(config.noise_floor_ms, timings.clone()),
            readback: Readback::new(config.readback_timeout),
            latency: LatencyModeSwitch::new(config.latency_mode),
            timings,
        }
    }

    /// Start (or restart) profiling with `pass_count` render passes. Any cycle left open by a
    /// previous session is ended first, and its queries are released.
    pub fn start_profiling<B>(
        &mut self,
        backend: &mut B,
        flush_interval: Duration,
        pass_count: usize,
    ) -> Result<()>
    where
        B: TimestampBackend<Query = Q>,
    {
        self.session.start(flush_interval, pass_count)?;
        if let Some(mut pool) = self.pool.take() {
            pool.end_open_cycles(backend);
        }
        self.pool = Some(QuerySlotPool::new(pass_count));
        self.aggregator.reset(pass_count);
        info!(
            target: "gpu_profiler",
            ?flush_interval,
            pass_count,
            mode = ?self.latency.get(),
            "profiling started"
        );
        Ok(())
    }

    pub fn stop_profiling<B>(&mut self, backend: &mut B)
    where
        B: TimestampBackend<Query = Q>,
    {
        if self.session.is_active() {
            info!(target: "gpu_profiler", "profiling stopped");
        }
        self.session.stop();
        if let Some(mut pool) = self.pool.take() {
            pool.end_open_cycles(backend);
        }
        self.aggregator.reset(0);
    }

    /// Read back the cycle due this frame, flush if the interval elapsed, then open a new
    /// cycle. Every call must be matched by [`on_end_overlay`](Self::on_end_overlay) in the
    /// same frame; an open cycle found here is dropped unread without waiting for the GPU.
    pub fn on_begin_frame<B>(&mut self, backend: &mut B) -> Result<()>
    where
        B: TimestampBackend<Query = Q>,
    {
        self.clock.tick();
        self.begin_frame(backend)
    }

    /// [`on_begin_frame`](Self::on_begin_frame) with an explicit host timestamp.
    pub fn on_begin_frame_at<B>(&mut self, backend: &mut B, now: crate::Timestamp) -> Result<()>
    where
        B: TimestampBackend<Query = Q>,
    {
        self.clock.tick_at(now);
        self.begin_frame(backend)
    }

    fn begin_frame<B>(&mut self, backend: &mut B) -> Result<()>
    where
        B: TimestampBackend<Query = Q>,
    {
        if let Err(err) = self.update_gpu_timings(backend) {
            error!(target: "gpu_profiler", %err, "gpu profiling disabled");
            self.stop_profiling(backend);
            return Err(err);
        }
        if let Some(pool) = &mut self.pool {
            pool.arm(backend);
        }
        Ok(())
    }

    fn update_gpu_timings<B>(&mut self, backend: &mut B) -> Result<()>
    where
        B: TimestampBackend<Query = Q>,
    {
        let pool = match &mut self.pool {
            Some(pool) => pool,
            None => return Ok(()),
        };
        pool.select(self.latency.get());

        if !pool.current_slot().is_created() {
            return pool.create_current(backend);
        }

        if let Some(queries) = pool.current_slot_mut().take_closed(backend) {
            self.aggregator.drain(backend, queries, &self.readback)?;
        }
        if self.session.advance(self.clock.elapsed()) {
            self.aggregator.flush();
        }
        Ok(())
    }

    pub fn on_end_capture<B>(&mut self, backend: &mut B)
    where
        B: TimestampBackend<Query = Q>,
    {
        if let Some(pool) = &mut self.pool {
            pool.mark_capture(backend);
        }
    }

    /// # Panics
    ///
    /// Panics while profiling if `index` is not below the pass count given to
    /// [`start_profiling`](Self::start_profiling).
    pub fn on_end_pass<B>(&mut self, backend: &mut B, index: usize)
    where
        B: TimestampBackend<Query = Q>,
    {
        if let Some(pool) = &mut self.pool {
            pool.mark_pass(backend, index);
        }
    }

    /// Must be the last mark of the frame and must follow every
    /// [`on_begin_frame`](Self::on_begin_frame). Backends that reset queries from the host
    /// (Vulkan) may otherwise reset one that the GPU is still writing.
    pub fn on_end_overlay<B>(&mut self, backend: &mut B)
    where
        B: TimestampBackend<Query = Q>,
    {
        if let Some(pool) = &mut self.pool {
            pool.close(backend);
        }
    }

    pub fn is_profiling(&self) -> bool {
        self.session.is_active()
    }

    pub fn pass_count(&self) -> usize {
        self.session.pass_count()
    }

    pub fn frames_per_second(&self) -> u32 {
        self.clock.frames_per_second()
    }

    pub fn frame_count(&self) -> u64 {
        self.clock.frame_count()
    }

    pub fn total_time(&self) -> Duration {
        self.clock.total_time()
    }

    pub fn elapsed_time(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn gpu_timings(&self) -> GpuTimings {
        self.timings.get()
    }

    pub fn timings_handle(&self) -> TimingsHandle {
        self.timings.clone()
    }

    /// Handle for switching between single and double buffering at runtime.
    pub fn latency_switch(&self) -> LatencyModeSwitch {
        self.latency.clone()
    }
}
