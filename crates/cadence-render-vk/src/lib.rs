// SPDX-License-Identifier: CEPL-1.0
//! Frame pacing and presentation on Vulkan.
//!
//! The core is generic over [`GpuDevice`]: [`Engine`] drives a [`FrameLoop`]
//! that owns the swapchain ([`Swapchain`]), the frame ring ([`FramePool`]) and
//! the per-image semaphores ([`PresentSync`]). [`VkPresenter`] wires that to
//! a real device through [`AshDevice`].
#![deny(unsafe_op_in_unsafe_fn)]

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_render::{FrameStatus, Presenter, RenderSize, WindowSignal};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

mod ash_device;
mod device;
mod engine;
mod error;
mod frame_loop;
mod frames;
mod present_sync;
mod swapchain;
mod transition;

pub use ash_device::AshDevice;
pub use device::{GpuDevice, Submission, SwapchainDesc};
pub use engine::Engine;
pub use error::{FrameError, FrameResult};
pub use frame_loop::{FrameLoop, RecordContext, TickOutcome, TickState};
pub use frames::{ring_index, FramePool, FrameSlot};
pub use present_sync::{image_slot, PresentSync};
pub use swapchain::{Swapchain, IMAGE_USAGE, PRESENT_MODE, SURFACE_FORMAT};
pub use transition::{aspect_for, layout_barrier, transition_image};

/// Length of the frame-slot ring: how far the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Bound on the per-tick fence wait and acquire (1 s). Expiry means a hung GPU.
pub const FRAME_TIMEOUT_NS: u64 = 1_000_000_000;

/// Clear colour for `frame_number`. With `pulse` the RGB channels are scaled
/// by `|sin(frame / 120)|`.
pub fn pulse_color(base: [f32; 4], pulse: bool, frame_number: u64) -> [f32; 4] {
    if !pulse {
        return base;
    }
    let flash = (frame_number as f32 / 120.0).sin().abs();
    [base[0] * flash, base[1] * flash, base[2] * flash, base[3]]
}

pub struct VkPresenter {
    engine: Engine<AshDevice>,
    clear: [f32; 4],
    pulse: bool,
}

impl Presenter for VkPresenter {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        let device = Arc::new(AshDevice::new(window, display).context("vulkan bootstrap")?);
        let engine = Engine::new(device, size).context("frame loop init")?;
        info!("vk presenter ready ({}x{})", size.width, size.height);
        Ok(Self {
            engine,
            clear: [0.0, 0.0, 1.0, 1.0],
            pulse: true,
        })
    }

    fn signal(&mut self, signal: WindowSignal) {
        self.engine.apply(signal);
    }

    fn frame(&mut self) -> Result<FrameStatus> {
        let (clear, pulse) = (self.clear, self.pulse);
        let status = self.engine.pump(|ctx| {
            let rgba = pulse_color(clear, pulse, ctx.frame_number);
            ctx.device.cmd_clear_color(ctx.command_buffer, ctx.image, rgba);
            Ok(())
        })?;
        Ok(status)
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.engine.recreate(size).context("swapchain recreate")
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = rgba;
    }

    fn set_pulse(&mut self, on: bool) {
        self.pulse = on;
    }

    fn frame_number(&self) -> u64 {
        self.engine.frame_number()
    }
}

impl Drop for VkPresenter {
    fn drop(&mut self) {
        // core resources go before the device context the engine shares
        self.engine.shutdown();
    }
}
