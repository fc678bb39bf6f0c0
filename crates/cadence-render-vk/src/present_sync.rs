// SPDX-License-Identifier: CEPL-1.0
//! Presentation Synchronizer: one "render complete" semaphore per swapchain
//! image.
//!
//! Sized to the chain, not to the frame ring. How many images can be queued
//! for presentation has nothing to do with how far the CPU runs ahead, so
//! these are looked up by acquired image index and never by frame number.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::GpuDevice;
use crate::error::{FrameError, FrameResult};

/// Position in a chain of `chain_len` images.
#[inline]
pub fn image_slot(image_index: u32, chain_len: usize) -> usize {
    image_index as usize % chain_len
}

pub struct PresentSync<D: GpuDevice> {
    device: Arc<D>,
    render_complete: Vec<vk::Semaphore>,
}

impl<D: GpuDevice> PresentSync<D> {
    pub fn new(device: Arc<D>, image_count: usize) -> FrameResult<Self> {
        let mut sync = Self {
            device,
            render_complete: Vec::with_capacity(image_count),
        };
        sync.init(image_count)?;
        Ok(sync)
    }

    /// Allocates one semaphore per image. Existing ones must be destroyed
    /// first.
    pub fn init(&mut self, image_count: usize) -> FrameResult<()> {
        debug_assert!(self.render_complete.is_empty());
        for _ in 0..image_count {
            let sem = self
                .device
                .create_semaphore()
                .map_err(FrameError::device("create_semaphore"))?;
            self.render_complete.push(sem);
        }
        debug!("render-complete semaphores: {}", image_count);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.render_complete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.render_complete.is_empty()
    }

    /// Semaphore for `image_index`, wrapped modulo the current chain length
    /// so a stale index right after a rebuild still lands somewhere valid.
    /// Null when nothing is allocated.
    #[inline]
    pub fn signal_for(&self, image_index: u32) -> vk::Semaphore {
        if self.render_complete.is_empty() {
            return vk::Semaphore::null();
        }
        self.render_complete[image_slot(image_index, self.render_complete.len())]
    }

    /// Same idle-device precondition as the swapchain. Idempotent.
    pub fn destroy(&mut self) {
        for sem in self.render_complete.drain(..) {
            self.device.destroy_semaphore(sem);
        }
    }
}

impl<D: GpuDevice> Drop for PresentSync<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
