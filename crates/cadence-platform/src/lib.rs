// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use cadence_render::{RenderSize, WindowSignal};
use tracing::trace;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;

pub fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize {
        width: size.width,
        height: size.height,
    }
}

/// Maps a window event onto what the frame loop cares about.
///
/// winit has no dedicated minimize event: an occluded window counts as
/// minimized and a zero-sized resize pauses through the gate itself.
pub fn signal_from_event(event: &WindowEvent) -> Option<WindowSignal> {
    let signal = match event {
        WindowEvent::CloseRequested | WindowEvent::Destroyed => WindowSignal::Quit,
        WindowEvent::Occluded(true) => WindowSignal::Minimized,
        WindowEvent::Occluded(false) => WindowSignal::Restored,
        WindowEvent::Resized(size) => WindowSignal::Resized {
            width: size.width,
            height: size.height,
        },
        _ => return None,
    };
    trace!("window signal {:?}", signal);
    Some(signal)
}
