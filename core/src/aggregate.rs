use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::backend::TimestampBackend;
use crate::error::Result;
use crate::query::SlotQueries;
use crate::readback::Readback;

/// Smoothed per-stage GPU time in milliseconds. Zero means no valid samples in the last
/// flush interval.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GpuTimings {
    pub capture_ms: f64,
    pub passes_ms: Vec<f64>,
    pub overlay_ms: f64,
}

/// Cloneable read handle on the latest published [`GpuTimings`].
#[derive(Clone, Debug, Default)]
pub struct TimingsHandle {
    inner: Arc<Mutex<GpuTimings>>,
}

impl TimingsHandle {
    pub fn get(&self) -> GpuTimings {
        self.inner.lock().clone()
    }

    fn publish(&self, timings: GpuTimings) {
        *self.inner.lock() = timings;
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct StageAccumulator {
    sum_ms: f64,
    samples: u32,
}

impl StageAccumulator {
    pub fn add(&mut self, ms: f64) {
        self.sum_ms += ms;
        self.samples += 1;
    }

    pub fn average(&self) -> f64 {
        if self.samples == 0 {
            0.
        } else {
            self.sum_ms / self.samples as f64
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    Accumulated,
    /// The GPU clock was not stable during the cycle; every sample was dropped.
    Disjoint,
}

/// Reads finished cycles and turns them into smoothed per-stage averages.
pub(crate) struct TimingAggregator {
    noise_floor_ms: f64,
    capture: StageAccumulator,
    passes: Vec<StageAccumulator>,
    overlay: StageAccumulator,
    published: TimingsHandle,
}

impl TimingAggregator {
    pub fn new(noise_floor_ms: f64, published: TimingsHandle) -> Self {
        Self {
            noise_floor_ms,
            capture: Default::default(),
            passes: Vec::new(),
            overlay: Default::default(),
            published,
        }
    }

    /// Clear all accumulators and the published snapshot, sized for `pass_count` passes.
    pub fn reset(&mut self, pass_count: usize) {
        self.capture = Default::default();
        self.passes = vec![Default::default(); pass_count];
        self.overlay = Default::default();
        self.published.publish(GpuTimings {
            passes_ms: vec![0.; pass_count],
            ..Default::default()
        });
    }

    pub fn drain<B: TimestampBackend>(
        &mut self,
        backend: &mut B,
        queries: &SlotQueries<B::Query>,
        readback: &Readback,
    ) -> Result<CycleOutcome> {
        let disjoint = readback.disjoint(backend, &queries.disjoint)?;
        if disjoint.disjoint || disjoint.frequency == 0 || disjoint.valid_bits == 0 {
            // Still read every timestamp so the queries are retired.
            for query in queries.timestamps() {
                readback.timestamp(backend, query)?;
            }
            debug!(target: "gpu_profiler", frequency = disjoint.frequency, "disjoint cycle dropped");
            return Ok(CycleOutcome::Disjoint);
        }

        let to_ms = 1000. / disjoint.frequency as f64;
        // Sign-extend from the counter width so a wrap inside the cycle still gives the
        // forward distance. Marks that went backwards count as zero.
        let valid_shift = 64 - disjoint.valid_bits.min(64);
        let mut last = readback.timestamp(backend, &queries.start)?;
        let mut next = |query: &B::Query| -> Result<f64> {
            let ts = readback.timestamp(backend, query)?;
            let delta = (ts.wrapping_sub(last) as i64)
                .wrapping_shl(valid_shift)
                .wrapping_shr(valid_shift)
                .max(0);
            last = ts;
            Ok(delta as f64 * to_ms)
        };

        let capture = next(&queries.capture_end)?;
        let mut passes = Vec::with_capacity(queries.pass_end.len());
        for query in queries.pass_end.iter() {
            passes.push(next(query)?);
        }
        let overlay = next(&queries.overlay_end)?;

        self.capture.add(capture);
        for (i, (acc, ms)) in self.passes.iter_mut().zip(passes).enumerate() {
            if ms > self.noise_floor_ms {
                acc.add(ms);
            } else {
                trace!(target: "gpu_profiler", pass = i, ms, "pass below noise floor");
            }
        }
        self.overlay.add(overlay);

        Ok(CycleOutcome::Accumulated)
    }

    /// Publish the averages of the interval just finished and start a new one.
    pub fn flush(&mut self) {
        let timings = GpuTimings {
            capture_ms: self.capture.average(),
            passes_ms: self.passes.iter().map(StageAccumulator::average).collect(),
            overlay_ms: self.overlay.average(),
        };
        trace!(target: "gpu_profiler", ?timings, "flushed gpu timings");
        self.published.publish(timings);

        self.capture = Default::default();
        self.passes.fill(Default::default());
        self.overlay = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LatencyMode;
    use crate::fake::FakeBackend;
    use crate::query::QuerySlotPool;

    fn record_cycle(
        backend: &mut FakeBackend,
        pool: &mut QuerySlotPool<usize>,
        capture: f64,
        passes: &[f64],
        overlay: f64,
    ) {
        pool.create_current(backend).unwrap();
        pool.arm(backend);
        backend.advance_ms(capture);
        pool.mark_capture(backend);
        for (i, ms) in passes.iter().enumerate() {
            backend.advance_ms(*ms);
            pool.mark_pass(backend, i);
        }
        backend.advance_ms(overlay);
        pool.close(backend);
    }

    fn drain(
        aggregator: &mut TimingAggregator,
        backend: &mut FakeBackend,
        pool: &mut QuerySlotPool<usize>,
    ) -> CycleOutcome {
        let readback = Readback::new(None);
        let queries = pool.current_slot_mut().take_closed(backend).unwrap();
        aggregator.drain(backend, queries, &readback).unwrap()
    }

    fn setup(pass_count: usize) -> (FakeBackend, QuerySlotPool<usize>, TimingAggregator) {
        let mut aggregator = TimingAggregator::new(0.01, TimingsHandle::default());
        aggregator.reset(pass_count);
        (FakeBackend::new(), QuerySlotPool::new(pass_count), aggregator)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn test_stage_durations() {
        let (mut backend, mut pool, mut aggregator) = setup(2);
        record_cycle(&mut backend, &mut pool, 2.0, &[1.0, 1.5], 0.5);
        assert_eq!(
            drain(&mut aggregator, &mut backend, &mut pool),
            CycleOutcome::Accumulated
        );

        assert_close(aggregator.capture.average(), 2.0);
        assert_close(aggregator.passes[0].average(), 1.0);
        assert_close(aggregator.passes[1].average(), 1.5);
        assert_close(aggregator.overlay.average(), 0.5);
    }

    #[test]
    fn test_noise_floor_excludes_only_that_pass() {
        let (mut backend, mut pool, mut aggregator) = setup(3);
        record_cycle(&mut backend, &mut pool, 1.0, &[0.5, 0.005, 0.7], 0.2);
        drain(&mut aggregator, &mut backend, &mut pool);

        let samples: Vec<u32> = aggregator.passes.iter().map(|p| p.samples).collect();
        assert_eq!(samples, [1, 0, 1]);
        // The next boundary is measured from the skipped pass's end, not from its start.
        assert_close(aggregator.passes[2].average(), 0.7);
        assert_eq!(aggregator.capture.samples, 1);
    }

    #[test]
    fn test_disjoint_cycle_drops_samples_and_drains() {
        let (mut backend, mut pool, mut aggregator) = setup(2);
        record_cycle(&mut backend, &mut pool, 2.0, &[1.0, 1.5], 0.5);
        drain(&mut aggregator, &mut backend, &mut pool);

        backend.set_next_disjoint(true);
        record_cycle(&mut backend, &mut pool, 9.0, &[9.0, 9.0], 9.0);
        backend.clear_reads();
        assert_eq!(
            drain(&mut aggregator, &mut backend, &mut pool),
            CycleOutcome::Disjoint
        );
        // disjoint + start + capture + 2 passes + overlay
        assert_eq!(backend.reads(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(aggregator.capture.samples, 1);
        assert_eq!(aggregator.overlay.samples, 1);

        record_cycle(&mut backend, &mut pool, 4.0, &[3.0, 0.5], 1.5);
        drain(&mut aggregator, &mut backend, &mut pool);
        assert_close(aggregator.capture.average(), 3.0);
        assert_close(aggregator.passes[0].average(), 2.0);
        assert_close(aggregator.passes[1].average(), 1.0);
        assert_close(aggregator.overlay.average(), 1.0);
    }

    #[test]
    fn test_zero_frequency_is_disjoint() {
        let (mut backend, mut pool, mut aggregator) = setup(1);
        backend.set_frequency(0);
        record_cycle(&mut backend, &mut pool, 2.0, &[1.0], 0.5);
        assert_eq!(
            drain(&mut aggregator, &mut backend, &mut pool),
            CycleOutcome::Disjoint
        );
        // disjoint + start + capture + 1 pass + overlay
        assert_eq!(backend.reads(), &[0, 1, 2, 3, 4]);
        assert_eq!(aggregator.capture.samples, 0);
        assert_eq!(aggregator.passes[0].samples, 0);
        assert_eq!(aggregator.overlay.samples, 0);
    }

    #[test]
    fn test_counter_wrap_inside_cycle() {
        let (mut backend, mut pool, mut aggregator) = setup(2);
        backend.set_valid_bits(32);
        // 1ms before the 32-bit counter wraps.
        backend.set_gpu_clock((1 << 32) - FakeBackend::FREQUENCY / 1000);
        record_cycle(&mut backend, &mut pool, 2.0, &[1.0, 0.5], 0.5);
        drain(&mut aggregator, &mut backend, &mut pool);

        assert_eq!(aggregator.capture.samples, 1);
        assert_close(aggregator.capture.average(), 2.0);
        assert_close(aggregator.passes[0].average(), 1.0);
        assert_close(aggregator.passes[1].average(), 0.5);
        assert_close(aggregator.overlay.average(), 0.5);
    }

    #[test]
    fn test_out_of_order_marks_count_as_zero() {
        let (mut backend, mut pool, mut aggregator) = setup(1);
        pool.create_current(&mut backend).unwrap();
        pool.arm(&mut backend);
        backend.advance_ms(3.0);
        pool.mark_capture(&mut backend);
        backend.set_gpu_clock(1_000);
        pool.mark_pass(&mut backend, 0);
        backend.advance_ms(1.0);
        pool.close(&mut backend);
        drain(&mut aggregator, &mut backend, &mut pool);

        assert_close(aggregator.capture.average(), 3.0);
        assert_eq!(aggregator.passes[0].samples, 0);
        assert_close(aggregator.overlay.average(), 1.0);
    }

    #[test]
    fn test_flush_publishes_and_resets() {
        let (mut backend, mut pool, mut aggregator) = setup(1);
        let handle = aggregator.published.clone();
        record_cycle(&mut backend, &mut pool, 2.0, &[1.0], 0.5);
        drain(&mut aggregator, &mut backend, &mut pool);
        record_cycle(&mut backend, &mut pool, 4.0, &[3.0], 1.5);
        drain(&mut aggregator, &mut backend, &mut pool);

        aggregator.flush();
        let timings = handle.get();
        assert_close(timings.capture_ms, 3.0);
        assert_close(timings.passes_ms[0], 2.0);
        assert_close(timings.overlay_ms, 1.0);
        assert_eq!(aggregator.capture.samples, 0);

        // An interval with no samples publishes zero, not the previous values.
        aggregator.flush();
        assert_eq!(
            handle.get(),
            GpuTimings {
                capture_ms: 0.,
                passes_ms: vec![0.],
                overlay_ms: 0.,
            }
        );
    }

    #[test]
    fn test_drain_ping_pong_slots() {
        let (mut backend, mut pool, mut aggregator) = setup(1);
        pool.select(LatencyMode::AvoidStalls);
        record_cycle(&mut backend, &mut pool, 1.0, &[1.0], 1.0);
        pool.select(LatencyMode::AvoidStalls);
        record_cycle(&mut backend, &mut pool, 2.0, &[2.0], 2.0);

        pool.select(LatencyMode::AvoidStalls);
        drain(&mut aggregator, &mut backend, &mut pool);
        assert_close(aggregator.capture.average(), 1.0);
    }
}
