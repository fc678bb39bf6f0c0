// SPDX-License-Identifier: CEPL-1.0
//! Surface Resource Manager: the presentable image chain and its views.

use std::sync::Arc;

use ash::vk;
use cadence_render::RenderSize;
use tracing::{info, warn};

use crate::device::{GpuDevice, SwapchainDesc};
use crate::error::{FrameError, FrameResult};
use crate::FRAMES_IN_FLIGHT;

pub const SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Vsync-aligned, frames queue instead of tearing or dropping.
pub const PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;

/// Images are written by transfer commands (clears, blits) as well as
/// colour attachments.
pub const IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> FrameResult<vk::SurfaceFormatKHR> {
    // A lone UNDEFINED entry means the surface takes anything.
    if formats.len() == 1 && formats[0].format == vk::Format::UNDEFINED {
        return Ok(SURFACE_FORMAT);
    }
    formats
        .iter()
        .copied()
        .find(|f| f.format == SURFACE_FORMAT.format && f.color_space == SURFACE_FORMAT.color_space)
        .ok_or_else(|| {
            FrameError::UnsupportedSurface(format!(
                "{:?}/{:?} not offered (have {} formats)",
                SURFACE_FORMAT.format,
                SURFACE_FORMAT.color_space,
                formats.len()
            ))
        })
}

pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> FrameResult<vk::PresentModeKHR> {
    if modes.contains(&PRESENT_MODE) {
        Ok(PRESENT_MODE)
    } else {
        Err(FrameError::UnsupportedSurface(format!(
            "present mode {PRESENT_MODE:?} not offered"
        )))
    }
}

pub(crate) fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the driver minimum, never fewer than the frame ring, capped
/// at the driver maximum (0 means unbounded).
pub(crate) fn image_count_from_caps(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = (caps.min_image_count + 1).max(FRAMES_IN_FLIGHT as u32);
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub struct Swapchain<D: GpuDevice> {
    device: Arc<D>,
    handle: vk::SwapchainKHR,
    format: vk::Format,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl<D: GpuDevice> Swapchain<D> {
    /// Builds the chain for `size`. Fails if the surface cannot take the fixed
    /// format, present mode or usage.
    pub fn new(device: Arc<D>, size: RenderSize) -> FrameResult<Self> {
        let mut sc = Self {
            device,
            handle: vk::SwapchainKHR::null(),
            format: SURFACE_FORMAT.format,
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            views: Vec::new(),
        };
        sc.create(size)?;
        Ok(sc)
    }

    /// Builds a fresh chain. The previous one must already be destroyed.
    pub fn create(&mut self, size: RenderSize) -> FrameResult<()> {
        debug_assert!(!self.is_live(), "create over a live swapchain");
        let d = &self.device;

        let caps = d
            .surface_capabilities()
            .map_err(FrameError::device("get_physical_device_surface_capabilities"))?;
        let formats = d
            .surface_formats()
            .map_err(FrameError::device("get_physical_device_surface_formats"))?;
        let modes = d
            .surface_present_modes()
            .map_err(FrameError::device("get_physical_device_surface_present_modes"))?;

        let format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&modes)?;
        if !caps.supported_usage_flags.contains(IMAGE_USAGE) {
            return Err(FrameError::UnsupportedSurface(format!(
                "usage {:?} not supported (have {:?})",
                IMAGE_USAGE, caps.supported_usage_flags
            )));
        }
        let extent = extent_from_caps(&caps, size);

        let desc = SwapchainDesc {
            min_image_count: image_count_from_caps(&caps),
            format,
            extent,
            usage: IMAGE_USAGE,
            present_mode,
            pre_transform: caps.current_transform,
        };
        let handle = d
            .create_swapchain(&desc)
            .map_err(FrameError::device("create_swapchain"))?;
        let images = match d.swapchain_images(handle) {
            Ok(images) => images,
            Err(e) => {
                d.destroy_swapchain(handle);
                return Err(FrameError::device("get_swapchain_images")(e));
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            match d.create_image_view(image, format.format) {
                Ok(view) => views.push(view),
                Err(e) => {
                    // never leave a half-built chain behind
                    for view in views {
                        d.destroy_image_view(view);
                    }
                    d.destroy_swapchain(handle);
                    return Err(FrameError::device("create_image_view")(e));
                }
            }
        }

        if images.len() < FRAMES_IN_FLIGHT {
            warn!(
                "swapchain has {} images but {} frames in flight; frames will serialize on acquire",
                images.len(),
                FRAMES_IN_FLIGHT
            );
        }
        info!(
            "swapchain ready ({}x{}, {:?}, {:?}, {} images)",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            images.len()
        );

        self.handle = handle;
        self.format = format.format;
        self.extent = extent;
        self.images = images;
        self.views = views;
        Ok(())
    }

    /// Releases the views, then the chain. The device must be idle. A second
    /// call without an intervening `create` does nothing.
    pub fn destroy(&mut self) {
        if !self.is_live() {
            return;
        }
        for view in self.views.drain(..) {
            self.device.destroy_image_view(view);
        }
        self.images.clear();
        self.device.destroy_swapchain(self.handle);
        self.handle = vk::SwapchainKHR::null();
    }

    /// Destroy then create. Never patches a chain in place.
    pub fn recreate(&mut self, size: RenderSize) -> FrameResult<()> {
        self.destroy();
        self.create(size)
    }

    pub fn is_live(&self) -> bool {
        self.handle != vk::SwapchainKHR::null()
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    pub fn view(&self, index: u32) -> vk::ImageView {
        self.views[index as usize]
    }
}

impl<D: GpuDevice> Drop for Swapchain<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
