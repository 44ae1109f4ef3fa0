//! Scriptable in-memory [`TimestampBackend`] used by the tests.

use crate::backend::{DisjointData, TimestampBackend};
use crate::error::BoxError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FakeEvent {
    BeginDisjoint(usize),
    EndDisjoint(usize),
    Timestamp(usize),
}

#[derive(Default)]
struct FakeQuery {
    timestamp: Option<u64>,
    disjoint: Option<DisjointData>,
    /// Polls left before the result is reported as ready.
    pending_polls: u32,
}

pub struct FakeBackend {
    frequency: u64,
    valid_bits: u32,
    gpu_clock: u64,
    next_disjoint: bool,
    poll_latency: u32,
    never_ready: bool,
    creation_budget: Option<usize>,

    queries: Vec<FakeQuery>,
    events: Vec<FakeEvent>,
    reads: Vec<usize>,
    polls: usize,
}

impl FakeBackend {
    /// GPU clock at 10 MHz: one tick is 0.1 µs.
    pub const FREQUENCY: u64 = 10_000_000;

    pub fn new() -> Self {
        Self {
            frequency: Self::FREQUENCY,
            valid_bits: 64,
            gpu_clock: 1_000,
            next_disjoint: false,
            poll_latency: 0,
            never_ready: false,
            creation_budget: None,
            queries: Vec::new(),
            events: Vec::new(),
            reads: Vec::new(),
            polls: 0,
        }
    }

    pub fn advance_ms(&mut self, ms: f64) {
        let ticks = (ms * Self::FREQUENCY as f64 / 1000.0).round() as u64;
        self.gpu_clock = self.gpu_clock.wrapping_add(ticks);
    }

    pub fn set_gpu_clock(&mut self, ticks: u64) {
        self.gpu_clock = ticks;
    }

    /// Reported tick rate. Zero makes every cycle unusable.
    pub fn set_frequency(&mut self, frequency: u64) {
        self.frequency = frequency;
    }

    /// Counter width; recorded timestamps keep only the low `bits` bits.
    pub fn set_valid_bits(&mut self, bits: u32) {
        self.valid_bits = bits;
    }

    /// Mark the cycle closed by the next `end_disjoint` as non-comparable.
    pub fn set_next_disjoint(&mut self, disjoint: bool) {
        self.next_disjoint = disjoint;
    }

    /// Results report not-ready this many times before they become available.
    pub fn set_poll_latency(&mut self, polls: u32) {
        self.poll_latency = polls;
    }

    pub fn set_never_ready(&mut self, never_ready: bool) {
        self.never_ready = never_ready;
    }

    pub fn fail_creation_after(&mut self, successes: usize) {
        self.creation_budget = Some(successes);
    }

    pub fn created(&self) -> usize {
        self.queries.len()
    }

    pub fn events(&self) -> &[FakeEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Queries whose result was successfully read, in order.
    pub fn reads(&self) -> &[usize] {
        &self.reads
    }

    pub fn clear_reads(&mut self) {
        self.reads.clear();
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    fn create(&mut self) -> Result<usize, BoxError> {
        if let Some(budget) = &mut self.creation_budget {
            if *budget == 0 {
                return Err("device removed".into());
            }
            *budget -= 1;
        }
        self.queries.push(FakeQuery::default());
        Ok(self.queries.len() - 1)
    }

    fn ready(&mut self, query: usize) -> bool {
        self.polls += 1;
        if self.never_ready {
            return false;
        }
        let q = &mut self.queries[query];
        if q.pending_polls > 0 {
            q.pending_polls -= 1;
            return false;
        }
        self.reads.push(query);
        true
    }
}

impl TimestampBackend for FakeBackend {
    type Query = usize;

    fn create_disjoint_query(&mut self) -> Result<usize, BoxError> {
        self.create()
    }

    fn create_timestamp_query(&mut self) -> Result<usize, BoxError> {
        self.create()
    }

    fn begin_disjoint(&mut self, query: &usize) {
        self.queries[*query].disjoint = None;
        self.events.push(FakeEvent::BeginDisjoint(*query));
    }

    fn end_disjoint(&mut self, query: &usize) {
        let q = &mut self.queries[*query];
        q.disjoint = Some(DisjointData {
            frequency: self.frequency,
            disjoint: self.next_disjoint,
            valid_bits: self.valid_bits,
        });
        q.pending_polls = self.poll_latency;
        self.next_disjoint = false;
        self.events.push(FakeEvent::EndDisjoint(*query));
    }

    fn end_timestamp(&mut self, query: &usize) {
        let q = &mut self.queries[*query];
        let mask = match self.valid_bits {
            bits @ 0..=63 => (1 << bits) - 1,
            _ => u64::MAX,
        };
        q.timestamp = Some(self.gpu_clock & mask);
        q.pending_polls = self.poll_latency;
        self.events.push(FakeEvent::Timestamp(*query));
    }

    fn poll_disjoint(&mut self, query: &usize) -> Option<DisjointData> {
        if !self.ready(*query) {
            return None;
        }
        self.queries[*query].disjoint
    }

    fn poll_timestamp(&mut self, query: &usize) -> Option<u64> {
        if !self.ready(*query) {
            return None;
        }
        self.queries[*query].timestamp
    }
}
