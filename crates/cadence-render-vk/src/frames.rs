// SPDX-License-Identifier: CEPL-1.0
//! Frame Slot Pool: the fixed ring of per-frame CPU resources.
//!
//! The ring length is independent of the swapchain image count, so the CPU
//! runs ahead of the GPU by a fixed depth whatever the presentation engine
//! decides to allocate.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::GpuDevice;
use crate::error::{FrameError, FrameResult};

/// Resources for one pipelined frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub command_pool: vk::CommandPool,
    /// Reset and re-recorded on every tick that lands on this slot.
    pub command_buffer: vk::CommandBuffer,
    /// Signalled when the last submission from this slot finished. Created
    /// signalled so the very first wait returns immediately.
    pub render_fence: vk::Fence,
    /// Signalled by acquire, waited on by submit.
    pub image_acquired: vk::Semaphore,
}

/// Ring position for a frame number.
#[inline]
pub fn ring_index(frame_number: u64, ring_len: usize) -> usize {
    (frame_number % ring_len as u64) as usize
}

pub struct FramePool<D: GpuDevice> {
    device: Arc<D>,
    slots: Vec<FrameSlot>,
}

impl<D: GpuDevice> FramePool<D> {
    pub fn new(device: Arc<D>, ring_len: usize) -> FrameResult<Self> {
        assert!(ring_len > 0, "frame ring must hold at least one slot");

        let mut pool = Self {
            device,
            slots: Vec::with_capacity(ring_len),
        };
        // Partial init unwinds through Drop.
        for i in 0..ring_len {
            let slot = pool.create_slot()?;
            debug!("frame slot {i}: {slot:?}");
            pool.slots.push(slot);
        }
        Ok(pool)
    }

    fn create_slot(&self) -> FrameResult<FrameSlot> {
        let d = &self.device;

        let command_pool = d
            .create_command_pool()
            .map_err(FrameError::device("create_command_pool"))?;
        let command_buffer = match d.allocate_command_buffer(command_pool) {
            Ok(cmd) => cmd,
            Err(e) => {
                d.destroy_command_pool(command_pool);
                return Err(FrameError::device("allocate_command_buffers")(e));
            }
        };
        let render_fence = match d.create_fence(true) {
            Ok(f) => f,
            Err(e) => {
                d.destroy_command_pool(command_pool);
                return Err(FrameError::device("create_fence")(e));
            }
        };
        let image_acquired = match d.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                d.destroy_fence(render_fence);
                d.destroy_command_pool(command_pool);
                return Err(FrameError::device("create_semaphore")(e));
            }
        };

        Ok(FrameSlot {
            command_pool,
            command_buffer,
            render_fence,
            image_acquired,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot at `frame_number mod len`. Pure; never touches the GPU.
    #[inline]
    pub fn slot(&self, frame_number: u64) -> &FrameSlot {
        &self.slots[ring_index(frame_number, self.slots.len())]
    }

    /// Releases every slot. The device must be idle. Calling it again is a
    /// no-op.
    pub fn destroy(&mut self) {
        for slot in self.slots.drain(..) {
            // Destroying the pool frees its command buffer.
            self.device.destroy_command_pool(slot.command_pool);
            self.device.destroy_fence(slot.render_fence);
            self.device.destroy_semaphore(slot.image_acquired);
        }
    }
}

impl<D: GpuDevice> Drop for FramePool<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
