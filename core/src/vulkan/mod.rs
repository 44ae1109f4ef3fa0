//! [`TimestampBackend`] over Vulkan timestamp queries.
//!
//! Vulkan has no disjoint query, so the validity probe always reports comparable timestamps
//! at the device's fixed timestamp period.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use spark::{vk, Builder};
use tracing::debug;

use crate::backend::{DisjointData, TimestampBackend};
use crate::error::BoxError;

type VkResult<T> = Result<T, vk::Result>;

const POOL_SIZE: u32 = 16;

type FreeList = Arc<Mutex<Vec<(Arc<QueryPool>, u32)>>>;

struct Device {
    handle: spark::Device,
    timestamp_period: f32,
    timestamp_valid_bits: u32,
}

struct QueryPool {
    device: Arc<Device>,
    handle: vk::QueryPool,
}

impl QueryPool {
    fn new(device: Arc<Device>, count: u32) -> VkResult<Arc<Self>> {
        let handle = unsafe {
            device.handle.create_query_pool(
                &vk::QueryPoolCreateInfo::builder()
                    .query_type(vk::QueryType::TIMESTAMP)
                    .query_count(count),
                None,
            )?
        };
        Ok(Arc::new(Self { device, handle }))
    }
}

impl Drop for QueryPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle
                .destroy_query_pool(Some(self.handle), None);
        }
    }
}

/// Query handle. The disjoint probe carries no GPU object.
///
/// Dropping a timestamp query hands its pool index back for reuse.
pub struct VulkanQuery {
    timestamp: Option<(Arc<QueryPool>, u32)>,
    free: FreeList,
}

impl Drop for VulkanQuery {
    fn drop(&mut self) {
        if let Some(entry) = self.timestamp.take() {
            self.free.lock().push(entry);
        }
    }
}

/// Vulkan timestamps recorded with `vkCmdWriteTimestamp2` and reset from the host.
///
/// Every mark host-resets its query before recording it, so the caller must keep the
/// profiler hooks balanced: each `on_begin_frame` is followed by `on_end_overlay` in the same
/// frame. A cycle left open is dropped without waiting, and its queries may still be pending
/// on the GPU when the slot is reused. For the same reason, stop or restart profiling only
/// after the frames recorded so far have completed, since dropped indices are recycled.
pub struct VulkanTimestamps {
    device: Arc<Device>,
    free: FreeList,
    command_buffer: Option<vk::CommandBuffer>,
}

impl VulkanTimestamps {
    /// The device must have `hostQueryReset` and `synchronization2` enabled.
    pub fn new(
        instance: spark::Instance,
        phys_device: vk::PhysicalDevice,
        device: spark::Device,
        queue_family_index: u32,
    ) -> Self {
        let (timestamp_period, timestamp_valid_bits) = unsafe {
            let limits = instance.get_physical_device_properties(phys_device).limits;
            let queue_family_properties =
                instance.get_physical_device_queue_family_properties_to_vec(phys_device);
            (
                limits.timestamp_period,
                queue_family_properties[queue_family_index as usize].timestamp_valid_bits,
            )
        };
        Self {
            device: Arc::new(Device {
                handle: device,
                timestamp_period,
                timestamp_valid_bits,
            }),
            free: Default::default(),
            command_buffer: None,
        }
    }

    /// Command buffer that subsequent marks are recorded into. Must be in the recording state
    /// whenever a profiler hook runs, and a frame's marks from `on_begin_frame` through
    /// `on_end_overlay` must all be submitted.
    pub fn set_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.command_buffer = Some(command_buffer);
    }

    fn allocate(&mut self) -> VkResult<(Arc<QueryPool>, u32)> {
        let mut free = self.free.lock();
        if let Some(query) = free.pop() {
            return Ok(query);
        }
        let pool = QueryPool::new(self.device.clone(), POOL_SIZE)?;
        debug!(target: "gpu_profiler", size = POOL_SIZE, "allocated vulkan query pool");
        free.extend((0..POOL_SIZE).rev().map(|i| (pool.clone(), i)));
        free.pop().ok_or(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
    }
}

/// Ticks per second for a device whose timestamps advance every `period` nanoseconds.
fn frequency_from_period(period: f32) -> u64 {
    if period > 0. {
        (1e9 / period as f64).round() as u64
    } else {
        0
    }
}

fn valid_mask(bits: u32) -> u64 {
    match bits {
        0 => 0,
        1..=63 => (1 << bits) - 1,
        _ => u64::MAX,
    }
}

impl TimestampBackend for VulkanTimestamps {
    type Query = VulkanQuery;

    fn create_disjoint_query(&mut self) -> Result<VulkanQuery, BoxError> {
        Ok(VulkanQuery {
            timestamp: None,
            free: self.free.clone(),
        })
    }

    fn create_timestamp_query(&mut self) -> Result<VulkanQuery, BoxError> {
        if self.device.timestamp_valid_bits == 0 {
            return Err("queue family does not support timestamps".into());
        }
        let query = self
            .allocate()
            .map_err(|err| format!("failed to create query pool: {err:?}"))?;
        Ok(VulkanQuery {
            timestamp: Some(query),
            free: self.free.clone(),
        })
    }

    fn begin_disjoint(&mut self, _query: &VulkanQuery) {}

    fn end_disjoint(&mut self, _query: &VulkanQuery) {}

    fn end_timestamp(&mut self, query: &VulkanQuery) {
        let (Some((pool, index)), Some(command_buffer)) = (&query.timestamp, self.command_buffer)
        else {
            return;
        };
        unsafe {
            self.device.handle.reset_query_pool(pool.handle, *index, 1);
            self.device.handle.cmd_write_timestamp2(
                command_buffer,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                pool.handle,
                *index,
            );
        }
    }

    fn poll_disjoint(&mut self, _query: &VulkanQuery) -> Option<DisjointData> {
        Some(DisjointData {
            frequency: frequency_from_period(self.device.timestamp_period),
            disjoint: false,
            valid_bits: self.device.timestamp_valid_bits,
        })
    }

    fn poll_timestamp(&mut self, query: &VulkanQuery) -> Option<u64> {
        let (pool, index) = query.timestamp.as_ref()?;
        let mut ts = [0u64; 1];
        let res = unsafe {
            self.device.handle.get_query_pool_results(
                pool.handle,
                *index,
                1,
                &mut ts,
                mem::size_of::<u64>() as _,
                vk::QueryResultFlags::N64,
            )
        };
        match res {
            Ok(vk::Result::SUCCESS) => Some(ts[0] & valid_mask(self.device.timestamp_valid_bits)),
            _ => None,
        }
    }
}
