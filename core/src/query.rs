use tracing::debug;

use crate::backend::TimestampBackend;
use crate::config::LatencyMode;
use crate::error::{Error, Result};

/// Query objects for one measurement cycle. Created together, dropped together.
pub(crate) struct SlotQueries<Q> {
    pub disjoint: Q,
    pub start: Q,
    pub capture_end: Q,
    pub pass_end: Box<[Q]>,
    pub overlay_end: Q,
}

impl<Q> SlotQueries<Q> {
    fn create<B>(backend: &mut B, pass_count: usize) -> Result<Self>
    where
        B: TimestampBackend<Query = Q>,
    {
        let disjoint = backend
            .create_disjoint_query()
            .map_err(Error::QueryCreation)?;
        let mut timestamp = || backend.create_timestamp_query().map_err(Error::QueryCreation);
        Ok(Self {
            disjoint,
            start: timestamp()?,
            capture_end: timestamp()?,
            pass_end: (0..pass_count)
                .map(|_| timestamp())
                .collect::<Result<Box<[Q]>>>()?,
            overlay_end: timestamp()?,
        })
    }

    /// Timestamp queries in boundary order: start, capture, passes, overlay.
    pub fn timestamps(&self) -> impl Iterator<Item = &Q> {
        [&self.start, &self.capture_end]
            .into_iter()
            .chain(self.pass_end.iter())
            .chain([&self.overlay_end])
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum CycleState {
    /// Nothing pending; the last cycle (if any) was read.
    Idle,
    /// Armed, waiting for the overlay mark.
    Open,
    /// All marks issued; results can be read.
    Closed,
}

pub(crate) struct QuerySlot<Q> {
    queries: Option<SlotQueries<Q>>,
    state: CycleState,
}

impl<Q> QuerySlot<Q> {
    fn empty() -> Self {
        Self {
            queries: None,
            state: CycleState::Idle,
        }
    }

    pub fn is_created(&self) -> bool {
        self.queries.is_some()
    }

    /// Take the closed cycle for reading. Returns `None` if nothing is ready to read.
    ///
    /// A cycle that was armed but never closed is ended here and dropped, so the disjoint
    /// probe stays balanced and nobody ever waits on it. Its marks may still be executing on
    /// the GPU when the slot is re-armed; callers keep begin-frame and overlay balanced.
    pub fn take_closed<B>(&mut self, backend: &mut B) -> Option<&SlotQueries<Q>>
    where
        B: TimestampBackend<Query = Q>,
    {
        let queries = self.queries.as_ref()?;
        let state = std::mem::replace(&mut self.state, CycleState::Idle);
        match state {
            CycleState::Closed => Some(queries),
            CycleState::Open => {
                debug!(target: "gpu_profiler", "dropping cycle that was never closed");
                backend.end_disjoint(&queries.disjoint);
                None
            }
            CycleState::Idle => None,
        }
    }
}

/// One or two query slots with lazily created queries.
///
/// Both slot records always exist; the second stays empty unless double buffering is used.
pub(crate) struct QuerySlotPool<Q> {
    slots: [QuerySlot<Q>; 2],
    current: usize,
    pass_count: usize,
}

impl<Q> QuerySlotPool<Q> {
    pub fn new(pass_count: usize) -> Self {
        Self {
            slots: [QuerySlot::empty(), QuerySlot::empty()],
            current: 0,
            pass_count,
        }
    }

    /// Select the slot to read and then rewrite this frame. In [`LatencyMode::AvoidStalls`]
    /// this flips to the other slot, whose cycle has had at least one full frame to finish;
    /// otherwise the slot written last frame is reused.
    pub fn select(&mut self, mode: LatencyMode) -> usize {
        if mode == LatencyMode::AvoidStalls {
            self.current = 1 - self.current;
        }
        self.current
    }

    pub fn current_slot(&self) -> &QuerySlot<Q> {
        &self.slots[self.current]
    }

    pub fn current_slot_mut(&mut self) -> &mut QuerySlot<Q> {
        &mut self.slots[self.current]
    }

    /// Create the current slot's queries. Does nothing if they already exist.
    pub fn create_current<B>(&mut self, backend: &mut B) -> Result<()>
    where
        B: TimestampBackend<Query = Q>,
    {
        let pass_count = self.pass_count;
        let slot = &mut self.slots[self.current];
        if slot.queries.is_none() {
            slot.queries = Some(SlotQueries::create(backend, pass_count)?);
            debug!(target: "gpu_profiler", slot = self.current, pass_count, "created query slot");
        }
        Ok(())
    }

    /// Start a new cycle on the current slot: open the disjoint probe and mark the start.
    pub fn arm<B>(&mut self, backend: &mut B)
    where
        B: TimestampBackend<Query = Q>,
    {
        let slot = &mut self.slots[self.current];
        if let Some(queries) = &slot.queries {
            backend.begin_disjoint(&queries.disjoint);
            backend.end_timestamp(&queries.start);
            slot.state = CycleState::Open;
        }
    }

    /// End any cycle still open, in either slot, before the pool is dropped.
    pub fn end_open_cycles<B>(&mut self, backend: &mut B)
    where
        B: TimestampBackend<Query = Q>,
    {
        for slot in &mut self.slots {
            slot.take_closed(backend);
        }
    }

    fn open_queries(&self) -> Option<&SlotQueries<Q>> {
        let slot = &self.slots[self.current];
        match slot.state {
            CycleState::Open => slot.queries.as_ref(),
            _ => None,
        }
    }

    pub fn mark_capture<B>(&mut self, backend: &mut B)
    where
        B: TimestampBackend<Query = Q>,
    {
        if let Some(queries) = self.open_queries() {
            backend.end_timestamp(&queries.capture_end);
        }
    }

    /// # Panics
    ///
    /// Panics if `index` is not below the pass count the pool was created with.
    pub fn mark_pass<B>(&mut self, backend: &mut B, index: usize)
    where
        B: TimestampBackend<Query = Q>,
    {
        assert!(
            index < self.pass_count,
            "pass index {index} out of range for {} passes",
            self.pass_count
        );
        if let Some(queries) = self.open_queries() {
            backend.end_timestamp(&queries.pass_end[index]);
        }
    }

    /// Mark the overlay end and close the cycle.
    pub fn close<B>(&mut self, backend: &mut B)
    where
        B: TimestampBackend<Query = Q>,
    {
        if let Some(queries) = self.open_queries() {
            backend.end_timestamp(&queries.overlay_end);
            backend.end_disjoint(&queries.disjoint);
            self.slots[self.current].state = CycleState::Closed;
        }
    }
}
