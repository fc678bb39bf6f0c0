// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use cadence_render::{FrameGate, FrameStatus, GateDecision, RenderSize, WindowSignal};
use tracing::{debug, info};

use crate::device::GpuDevice;
use crate::error::FrameResult;
use crate::frame_loop::{FrameLoop, RecordContext, TickOutcome};

/// Outer loop: window gating, rebuild requests, then one tick.
///
/// Owns the whole core for one surface. Pass it (or the presenter wrapping
/// it) to whatever needs it; there is no process-wide instance.
pub struct Engine<D: GpuDevice> {
    frame_loop: FrameLoop<D>,
    gate: FrameGate,
    needs_recreate: bool,
}

impl<D: GpuDevice> Engine<D> {
    pub fn new(device: Arc<D>, size: RenderSize) -> FrameResult<Self> {
        let frame_loop = FrameLoop::new(device, size)?;
        Ok(Self {
            frame_loop,
            gate: FrameGate::new(size),
            needs_recreate: false,
        })
    }

    pub fn apply(&mut self, signal: WindowSignal) {
        self.gate.apply(signal);
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_loop.frame_number()
    }

    pub fn frame_loop(&self) -> &FrameLoop<D> {
        &self.frame_loop
    }

    /// One outer-loop iteration. Issues no GPU call at all while paused or
    /// after quit.
    pub fn pump<F>(&mut self, draw: F) -> FrameResult<FrameStatus>
    where
        F: FnOnce(&RecordContext<'_, D>) -> anyhow::Result<()>,
    {
        let resize = match self.gate.decide() {
            GateDecision::Quit => return Ok(FrameStatus::Quit),
            GateDecision::Paused => return Ok(FrameStatus::Paused),
            GateDecision::Run { resize } => resize,
        };

        if resize.is_some() || self.needs_recreate {
            let size = resize.unwrap_or_else(|| self.gate.size());
            debug!("rebuilding surface at {}x{}", size.width, size.height);
            self.frame_loop.recreate(size)?;
            self.needs_recreate = false;
        }

        let outcome = self.frame_loop.tick(draw)?;
        self.needs_recreate = outcome.needs_recreate();
        Ok(match outcome {
            TickOutcome::Presented { .. } => FrameStatus::Presented,
            TickOutcome::OutOfDate { .. } => FrameStatus::Skipped,
        })
    }

    /// Rebuilds the surface right away. A zero extent pauses instead, since
    /// no chain can be built for it.
    pub fn recreate(&mut self, size: RenderSize) -> FrameResult<()> {
        if size.is_empty() {
            self.gate.apply(WindowSignal::Resized {
                width: size.width,
                height: size.height,
            });
            return Ok(());
        }
        self.frame_loop.recreate(size)?;
        self.gate.settle(size);
        self.needs_recreate = false;
        Ok(())
    }

    /// Tears everything down and stops the loop. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.gate.apply(WindowSignal::Quit);
        self.frame_loop.destroy();
        info!("engine shut down");
    }
}
