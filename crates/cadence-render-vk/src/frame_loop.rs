// SPDX-License-Identifier: CEPL-1.0
//! Frame Loop Controller: acquire → record → submit → present, once per tick.
//!
//! ```text
//! Idle → AcquireWait → Recording → Submitted → Presenting → Idle
//! ```
//!
//! Per tick the CPU blocks in exactly two places, both bounded by
//! [`FRAME_TIMEOUT_NS`]: the slot's render fence and the acquire call. Expiry
//! of either is fatal. Presentation is ordered after submission through the
//! per-image semaphore only; the CPU never waits for the GPU in between.

use std::sync::Arc;

use ash::vk;
use cadence_render::RenderSize;
use tracing::{info, trace, warn};

use crate::device::{GpuDevice, Submission};
use crate::error::{FrameError, FrameResult};
use crate::frames::{ring_index, FramePool};
use crate::present_sync::PresentSync;
use crate::swapchain::Swapchain;
use crate::transition::transition_image;
use crate::{FRAMES_IN_FLIGHT, FRAME_TIMEOUT_NS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickState {
    Idle,
    AcquireWait,
    Recording,
    Submitted,
    Presenting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Presented {
        frame_number: u64,
        slot: usize,
        image_index: u32,
        /// Acquire or present reported the surface as sub-optimal (or present
        /// found it out of date). The frame still went out.
        suboptimal: bool,
    },
    /// Acquire found the surface out of date. Nothing was recorded,
    /// submitted or presented.
    OutOfDate { frame_number: u64 },
}

impl TickOutcome {
    pub fn needs_recreate(&self) -> bool {
        match *self {
            TickOutcome::Presented { suboptimal, .. } => suboptimal,
            TickOutcome::OutOfDate { .. } => true,
        }
    }
}

/// Handed to the draw callback while the slot's command buffer is recording.
/// The image is in `GENERAL` layout. The callback must only record: no
/// submits, no presents, no waits.
pub struct RecordContext<'a, D: GpuDevice> {
    pub device: &'a D,
    pub command_buffer: vk::CommandBuffer,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub image_index: u32,
    pub frame_number: u64,
}

pub struct FrameLoop<D: GpuDevice> {
    device: Arc<D>,
    swapchain: Swapchain<D>,
    frames: FramePool<D>,
    present_sync: PresentSync<D>,
    frame_number: u64,
    state: TickState,
}

impl<D: GpuDevice> FrameLoop<D> {
    pub fn new(device: Arc<D>, size: RenderSize) -> FrameResult<Self> {
        let swapchain = Swapchain::new(device.clone(), size)?;
        let frames = FramePool::new(device.clone(), FRAMES_IN_FLIGHT)?;
        let present_sync = PresentSync::new(device.clone(), swapchain.image_count())?;

        info!(
            "frame loop ready ({} frames in flight, {} swapchain images)",
            frames.len(),
            swapchain.image_count()
        );

        Ok(Self {
            device,
            swapchain,
            frames,
            present_sync,
            frame_number: 0,
            state: TickState::Idle,
        })
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn state(&self) -> TickState {
        self.state
    }

    pub fn swapchain(&self) -> &Swapchain<D> {
        &self.swapchain
    }

    pub fn frames(&self) -> &FramePool<D> {
        &self.frames
    }

    pub fn present_sync(&self) -> &PresentSync<D> {
        &self.present_sync
    }

    #[inline]
    fn enter(&mut self, state: TickState) {
        trace!(frame = self.frame_number, "{:?} → {:?}", self.state, state);
        self.state = state;
    }

    /// Runs one tick. The frame counter advances exactly once whatever the
    /// outcome, so ring rotation never starves a slot.
    pub fn tick<F>(&mut self, draw: F) -> FrameResult<TickOutcome>
    where
        F: FnOnce(&RecordContext<'_, D>) -> anyhow::Result<()>,
    {
        let outcome = self.run_tick(draw);
        self.enter(TickState::Idle);
        self.frame_number += 1;
        outcome
    }

    fn run_tick<F>(&mut self, draw: F) -> FrameResult<TickOutcome>
    where
        F: FnOnce(&RecordContext<'_, D>) -> anyhow::Result<()>,
    {
        let device = Arc::clone(&self.device);
        let d = &*device;
        let frame_number = self.frame_number;
        let slot_index = ring_index(frame_number, self.frames.len());
        let slot = *self.frames.slot(frame_number);

        // 1) Wait until the GPU is done with this slot's previous submission.
        self.enter(TickState::AcquireWait);
        d.wait_for_fence(slot.render_fence, FRAME_TIMEOUT_NS)
            .map_err(FrameError::bounded("wait_for_fences", FRAME_TIMEOUT_NS))?;

        // 2) Acquire
        let (image_index, acquire_suboptimal) = match d.acquire_next_image(
            self.swapchain.handle(),
            FRAME_TIMEOUT_NS,
            slot.image_acquired,
        ) {
            Ok(pair) => pair,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                warn!(frame = frame_number, "acquire: surface out of date, skipping tick");
                return Ok(TickOutcome::OutOfDate { frame_number });
            }
            Err(e) => {
                return Err(FrameError::bounded("acquire_next_image", FRAME_TIMEOUT_NS)(e));
            }
        };
        // Unsignal only once a submit is certain to follow: a skipped tick
        // must leave the fence signalled or the next wait on it never returns.
        d.reset_fence(slot.render_fence)
            .map_err(FrameError::device("reset_fences"))?;

        // 3) Record
        self.enter(TickState::Recording);
        let cmd = slot.command_buffer;
        let image = self.swapchain.image(image_index);
        d.reset_command_buffer(cmd)
            .map_err(FrameError::device("reset_command_buffer"))?;
        d.begin_command_buffer(cmd)
            .map_err(FrameError::device("begin_command_buffer"))?;

        transition_image(d, cmd, image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
        let ctx = RecordContext {
            device: d,
            command_buffer: cmd,
            image,
            view: self.swapchain.view(image_index),
            extent: self.swapchain.extent(),
            image_index,
            frame_number,
        };
        draw(&ctx).map_err(FrameError::Draw)?;
        transition_image(
            d,
            cmd,
            image,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        d.end_command_buffer(cmd)
            .map_err(FrameError::device("end_command_buffer"))?;

        // 4) Submit: wait for the image, signal this image's render-complete,
        //    and the slot fence once the GPU is through.
        let render_complete = self.present_sync.signal_for(image_index);
        let submission = Submission {
            command_buffer: cmd,
            wait_semaphore: slot.image_acquired,
            wait_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: render_complete,
            signal_stage: vk::PipelineStageFlags2::ALL_GRAPHICS,
        };
        d.queue_submit(&submission, slot.render_fence)
            .map_err(FrameError::device("queue_submit2"))?;
        self.enter(TickState::Submitted);

        // 5) Present, ordered behind the render-complete semaphore.
        self.enter(TickState::Presenting);
        let present_suboptimal =
            match d.queue_present(self.swapchain.handle(), image_index, render_complete) {
                Ok(suboptimal) => suboptimal,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    warn!(frame = frame_number, "present: surface out of date");
                    true
                }
                Err(e) => return Err(FrameError::device("queue_present")(e)),
            };

        let suboptimal = acquire_suboptimal || present_suboptimal;
        if suboptimal {
            warn!(frame = frame_number, "surface sub-optimal, rebuild requested");
        }
        Ok(TickOutcome::Presented {
            frame_number,
            slot: slot_index,
            image_index,
            suboptimal,
        })
    }

    /// Rebuilds the chain and its per-image semaphores at `size`.
    ///
    /// Exclusive: waits for the whole device to go idle first, so no tick may
    /// be in flight. The frame ring is untouched.
    pub fn recreate(&mut self, size: RenderSize) -> FrameResult<()> {
        self.device
            .wait_idle()
            .map_err(FrameError::device("device_wait_idle"))?;

        self.present_sync.destroy();
        self.swapchain.recreate(size)?;
        self.present_sync.init(self.swapchain.image_count())?;

        info!(
            "swapchain recreated at {}x{} (frame {})",
            self.swapchain.extent().width,
            self.swapchain.extent().height,
            self.frame_number
        );
        Ok(())
    }

    // STRICT TEARDOWN ORDER:
    // device idle → per-frame slots → per-image semaphores → views → chain.
    // The device itself outlives us; its owner destroys it.
    /// Idempotent: a second call finds nothing left and returns.
    pub fn destroy(&mut self) {
        if self.frames.is_empty() && self.present_sync.is_empty() && !self.swapchain.is_live() {
            return;
        }
        if let Err(e) = self.device.wait_idle() {
            warn!("device_wait_idle before teardown: {e}");
        }
        self.frames.destroy();
        self.present_sync.destroy();
        self.swapchain.destroy();
        info!("frame loop torn down after {} frames", self.frame_number);
    }
}

impl<D: GpuDevice> Drop for FrameLoop<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
