// SPDX-License-Identifier: CEPL-1.0
use tracing::{debug, info};

use crate::{RenderSize, WindowSignal};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Quit,
    Paused,
    /// Tick. `resize` carries an extent the surface must be rebuilt to first.
    Run { resize: Option<RenderSize> },
}

/// Decides whether the outer loop is allowed to tick at all.
///
/// Minimize pauses until restore. A zero-sized window pauses too, since no
/// swapchain can be built for it; the first non-zero resize afterwards both
/// unpauses and queues a rebuild.
#[derive(Debug)]
pub struct FrameGate {
    quit: bool,
    minimized: bool,
    size: RenderSize,
    pending_resize: Option<RenderSize>,
}

impl FrameGate {
    pub fn new(size: RenderSize) -> Self {
        Self {
            quit: false,
            minimized: false,
            size,
            pending_resize: None,
        }
    }

    pub fn apply(&mut self, signal: WindowSignal) {
        match signal {
            WindowSignal::Quit => {
                info!("quit requested");
                self.quit = true;
            }
            WindowSignal::Minimized => {
                if !self.minimized {
                    info!("minimized → paused");
                }
                self.minimized = true;
            }
            WindowSignal::Restored => {
                if self.minimized {
                    info!("restored → resuming");
                }
                self.minimized = false;
            }
            WindowSignal::Resized { width, height } => {
                let size = RenderSize { width, height };
                if size == self.size && self.pending_resize.is_none() {
                    return;
                }
                debug!("resized → {}x{}", width, height);
                self.size = size;
                self.pending_resize = (!size.is_empty()).then_some(size);
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.minimized || self.size.is_empty()
    }

    /// Latest extent reported by the window.
    pub fn size(&self) -> RenderSize {
        self.size
    }

    /// Records that the surface was rebuilt at `size` outside the loop, so no
    /// further rebuild is pending for it.
    pub fn settle(&mut self, size: RenderSize) {
        self.size = size;
        self.pending_resize = None;
    }

    /// Consumes the pending resize only when the loop is allowed to run.
    pub fn decide(&mut self) -> GateDecision {
        if self.quit {
            GateDecision::Quit
        } else if self.is_paused() {
            GateDecision::Paused
        } else {
            GateDecision::Run {
                resize: self.pending_resize.take(),
            }
        }
    }
}
