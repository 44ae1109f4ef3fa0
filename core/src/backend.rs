use crate::error::BoxError;

/// Result of a disjoint (validity) query for one measurement cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DisjointData {
    /// Timestamp ticks per second for the cycle.
    pub frequency: u64,
    /// Set when timestamps in the cycle must not be compared with each other.
    pub disjoint: bool,
    /// Width of the GPU counter. Timestamps wrap at `2^valid_bits`; 64 means they never do
    /// in practice.
    pub valid_bits: u32,
}

/// The slice of a graphics device the profiler needs.
///
/// Implementations wrap both the device (query creation) and the command context (marking
/// and reading). All calls come from the render thread in submission order.
pub trait TimestampBackend {
    type Query;

    fn create_disjoint_query(&mut self) -> Result<Self::Query, BoxError>;

    fn create_timestamp_query(&mut self) -> Result<Self::Query, BoxError>;

    fn begin_disjoint(&mut self, query: &Self::Query);

    fn end_disjoint(&mut self, query: &Self::Query);

    /// Record the GPU clock when execution reaches this point in the command stream.
    fn end_timestamp(&mut self, query: &Self::Query);

    /// Non-blocking. `None` until the GPU has finished the cycle.
    fn poll_disjoint(&mut self, query: &Self::Query) -> Option<DisjointData>;

    /// Non-blocking. `None` until the GPU has executed past the mark.
    fn poll_timestamp(&mut self, query: &Self::Query) -> Option<u64>;
}
