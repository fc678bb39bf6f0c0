// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod gate;

pub use gate::{FrameGate, GateDecision};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What the window collaborator reports once per outer-loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowSignal {
    Quit,
    Minimized,
    Restored,
    Resized { width: u32, height: u32 },
}

/// Result of one outer-loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Quit was requested; no GPU work was issued.
    Quit,
    /// Minimized or zero-sized; no GPU work was issued.
    Paused,
    /// One frame went through acquire, record, submit and present.
    Presented,
    /// The surface was stale; the tick was dropped and a rebuild is queued.
    Skipped,
}

pub trait Presenter {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Feed a window signal; takes effect on the next `frame`.
    fn signal(&mut self, signal: WindowSignal);
    fn frame(&mut self) -> Result<FrameStatus>;
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_pulse(&mut self, _on: bool) {}
    fn frame_number(&self) -> u64;
}
