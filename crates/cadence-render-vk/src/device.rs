// SPDX-License-Identifier: CEPL-1.0
//! The device context the core consumes but does not own.
//!
//! [`GpuDevice`] is the only door to the GPU: every call the frame loop, the
//! swapchain and the sync pools make goes through it. [`AshDevice`] is the
//! real implementation; tests drive the same protocol against a simulated one.
//!
//! Handles passed in must have been created by the same device and not yet
//! destroyed.
//!
//! [`AshDevice`]: crate::AshDevice

use ash::prelude::VkResult;
use ash::vk;

/// One command buffer plus its wait/signal dependencies, for a single
/// graphics-queue submission.
#[derive(Clone, Copy, Debug)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags2,
    pub signal_semaphore: vk::Semaphore,
    pub signal_stage: vk::PipelineStageFlags2,
}

/// Everything needed to build a swapchain for the device's surface.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

pub trait GpuDevice {
    /// Family index of the single graphics + present queue.
    fn queue_family_index(&self) -> u32;

    /// Blocks until every queue on the device is idle.
    fn wait_idle(&self) -> VkResult<()>;

    // --- sync objects ---
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// `Err(TIMEOUT)` when `timeout_ns` expires first.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // --- command recording ---
    /// Pool on the graphics family whose buffers can be reset individually.
    fn create_command_pool(&self) -> VkResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer>;
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    /// Starts a one-time-submit recording session.
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &vk::ImageMemoryBarrier2<'_>);
    /// Clears every mip and layer of a colour image in `GENERAL` layout.
    fn cmd_clear_color(&self, cmd: vk::CommandBuffer, image: vk::Image, rgba: [f32; 4]);

    // --- queue ---
    fn queue_submit(&self, submission: &Submission, fence: vk::Fence) -> VkResult<()>;
    /// `Ok(true)` means presented but sub-optimal.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;

    // --- surface and swapchain ---
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;
    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    /// `Ok((index, suboptimal))`; `Err(ERROR_OUT_OF_DATE_KHR)` when stale,
    /// `Err(TIMEOUT)` when `timeout_ns` expires first.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
}
