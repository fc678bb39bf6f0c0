// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr};

use anyhow::{anyhow, Context, Result};
#[cfg(debug_assertions)]
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::{debug, error, info, warn};

use crate::device::{GpuDevice, Submission, SwapchainDesc};

#[cfg(debug_assertions)]
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[cfg(debug_assertions)]
type DebugState = Option<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)>;
#[cfg(not(debug_assertions))]
type DebugState = ();

/// The device context: instance, surface, one logical device and its single
/// graphics + present queue.
///
/// Created before the frame-pacing core and dropped after it. Everything here
/// is bootstrap; none of it takes part in per-frame coordination.
pub struct AshDevice {
    _entry: Entry,
    instance: Instance,
    debug: DebugState,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,

    swapchain_loader: swapchain::Device,
}

// STRICT TEARDOWN ORDER (everything the core made is already gone):
// device idle → device → debug messenger → surface → instance.
impl Drop for AshDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);

            #[cfg(debug_assertions)]
            {
                if let Some((loader, messenger)) = self.debug.take() {
                    loader.destroy_debug_utils_messenger(messenger, None);
                }
            }

            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        debug!("vulkan device context destroyed");
    }
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { (*data).message_as_c_str() }
        .map(CStr::to_string_lossy)
        .unwrap_or_default();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan] {msg}");
    } else {
        debug!("[vulkan] {msg}");
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
fn validation_available(entry: &Entry) -> bool {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    layers
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER))
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> Result<Instance> {
    let app_name = c"Cadence";

    let app_info = vk::ApplicationInfo {
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: app_name.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_3,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    let mut layers: Vec<*const c_char> = Vec::new();
    #[cfg(debug_assertions)]
    {
        if validation {
            extensions.push(ext_debug::NAME.as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }
    }
    #[cfg(not(debug_assertions))]
    let _ = validation;

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    Ok(unsafe { entry.create_instance(&create_info, None) }.context("create_instance")?)
}

#[cfg(debug_assertions)]
unsafe fn create_debug_messenger(entry: &Entry, instance: &Instance) -> Result<DebugState> {
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = unsafe { loader.create_debug_utils_messenger(&ci, None) }
        .context("create_debug_utils_messenger")?;
    Ok(Some((loader, messenger)))
}

/// Needs Vulkan 1.3, swapchain support, and the 1.2/1.3 features the
/// renderer is built around.
unsafe fn device_is_suitable(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    let props = unsafe { instance.get_physical_device_properties(phys) };
    if vk::api_version_major(props.api_version) < 1
        || (vk::api_version_major(props.api_version) == 1
            && vk::api_version_minor(props.api_version) < 3)
    {
        return false;
    }

    let has_swapchain = unsafe { instance.enumerate_device_extension_properties(phys) }
        .unwrap_or_default()
        .iter()
        .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == swapchain::NAME));
    if !has_swapchain {
        return false;
    }

    let mut f13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut f12 = vk::PhysicalDeviceVulkan12Features::default();
    {
        let mut f2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut f13)
            .push_next(&mut f12);
        unsafe { instance.get_physical_device_features2(phys, &mut f2) };
    }
    f13.dynamic_rendering == vk::TRUE
        && f13.synchronization2 == vk::TRUE
        && f12.buffer_device_address == vk::TRUE
        && f12.descriptor_indexing == vk::TRUE
}

unsafe fn pick_device_and_queue(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    for phys in unsafe { instance.enumerate_physical_devices()? } {
        if !unsafe { device_is_suitable(instance, phys) } {
            continue;
        }
        let qprops = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        for (i, q) in qprops.iter().enumerate() {
            let present = unsafe {
                surface_loader.get_physical_device_surface_support(phys, i as u32, surface)
            }
            .unwrap_or(false);
            if q.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present {
                return Ok((phys, i as u32));
            }
        }
    }
    Err(anyhow!("no Vulkan 1.3 device with a graphics+present queue"))
}

impl AshDevice {
    pub fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        unsafe { Self::build(window, display) }
    }

    unsafe fn build(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        let entry = unsafe { Entry::load() }.context("loading the Vulkan loader")?;

        let dh: RawDisplayHandle = display.display_handle()?.as_raw();
        let wh: RawWindowHandle = window.window_handle()?.as_raw();

        #[cfg(debug_assertions)]
        let validation = validation_available(&entry);
        #[cfg(not(debug_assertions))]
        let validation = false;
        if cfg!(debug_assertions) && !validation {
            warn!("validation layer not installed; running without it");
        }

        let instance = unsafe { create_instance(&entry, dh, validation)? };

        #[cfg(debug_assertions)]
        let debug = if validation {
            unsafe { create_debug_messenger(&entry, &instance)? }
        } else {
            None
        };
        #[cfg(not(debug_assertions))]
        let debug = ();

        let surface = unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) }
            .context("create_surface")?;
        let surface_loader = surface::Instance::new(&entry, &instance);

        let (phys, queue_family) =
            unsafe { pick_device_and_queue(&instance, &surface_loader, surface)? };

        // Device + queue
        let priorities = [1.0_f32];
        let qinfo = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)];

        let mut f13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let mut f12 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .descriptor_indexing(true);

        let device_exts = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo::default()
            .queue_create_infos(&qinfo)
            .enabled_extension_names(&device_exts)
            .push_next(&mut f13)
            .push_next(&mut f12);

        let device = unsafe { instance.create_device(phys, &dinfo, None) }.context("create_device")?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        let props = unsafe { instance.get_physical_device_properties(phys) };
        info!(
            "vulkan device: {} (api {}.{}, queue family {})",
            props.device_name_as_c_str().map(CStr::to_string_lossy).unwrap_or_default(),
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            queue_family
        );

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            surface_loader,
            surface,
            phys,
            device,
            queue_family,
            queue,
            swapchain_loader,
        })
    }
}

impl GpuDevice for AshDevice {
    fn queue_family_index(&self) -> u32 {
        self.queue_family
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let ci = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&ci, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        let ci = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        unsafe { self.device.create_command_pool(&ci, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let ai = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let bufs = unsafe { self.device.allocate_command_buffers(&ai)? };
        Ok(bufs[0])
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let begin = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &begin) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &vk::ImageMemoryBarrier2<'_>) {
        let dep = vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(barrier));
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dep) }
    }

    fn cmd_clear_color(&self, cmd: vk::CommandBuffer, image: vk::Image, rgba: [f32; 4]) {
        let clear = vk::ClearColorValue { float32: rgba };
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        };
        unsafe {
            self.device
                .cmd_clear_color_image(cmd, image, vk::ImageLayout::GENERAL, &clear, &[range])
        }
    }

    fn queue_submit(&self, submission: &Submission, fence: vk::Fence) -> VkResult<()> {
        let cmd_info = [vk::CommandBufferSubmitInfo::default().command_buffer(submission.command_buffer)];
        let wait_info = [vk::SemaphoreSubmitInfo::default()
            .semaphore(submission.wait_semaphore)
            .stage_mask(submission.wait_stage)
            .value(1)];
        let signal_info = [vk::SemaphoreSubmitInfo::default()
            .semaphore(submission.signal_semaphore)
            .stage_mask(submission.signal_stage)
            .value(1)];
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_info)
            .command_buffer_infos(&cmd_info)
            .signal_semaphore_infos(&signal_info);
        unsafe {
            self.device
                .queue_submit2(self.queue, std::slice::from_ref(&submit), fence)
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let swapchains = [swapchain];
        let indices = [image_index];
        let waits = [wait];
        let present = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { self.swapchain_loader.queue_present(self.queue, &present) }
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.surface)
        }
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.phys, self.surface)
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.surface)
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let ci = vk::SwapchainCreateInfoKHR {
            surface: self.surface,
            min_image_count: desc.min_image_count,
            image_format: desc.format.format,
            image_color_space: desc.format.color_space,
            image_extent: desc.extent,
            image_array_layers: 1,
            image_usage: desc.usage,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: desc.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: desc.present_mode,
            clipped: vk::TRUE,
            ..Default::default()
        };
        unsafe { self.swapchain_loader.create_swapchain(&ci, None) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView> {
        let ci = vk::ImageViewCreateInfo {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&ci, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        }
    }
}
