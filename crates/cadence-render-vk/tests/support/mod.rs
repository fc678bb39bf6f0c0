// SPDX-License-Identifier: CEPL-1.0
//! A simulated GPU for driving the frame loop without a driver.
//!
//! Time is virtual. Submissions run one after another on a single queue, each
//! taking `gpu_latency_ns`; fence waits jump the clock forward to the
//! matching completion (or by the full timeout when it would not arrive in
//! time). Misuse the real validation layer would catch is recorded as a
//! violation instead of crashing.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use cadence_render::RenderSize;
use cadence_render_vk::{GpuDevice, Submission, SwapchainDesc};

pub const MS: u64 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Fence,
    Semaphore,
    CommandPool,
    Swapchain,
    ImageView,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    WaitIdle,
    /// `at_ns` is the virtual time the wait returned.
    WaitFence { fence: u64, at_ns: u64, timed_out: bool },
    ResetFence(u64),
    Acquire { semaphore: u64, image_index: Option<u32> },
    ResetCommandBuffer { cmd: u64, at_ns: u64 },
    Begin(u64),
    Barrier { image: u64, old: vk::ImageLayout, new: vk::ImageLayout },
    Clear { image: u64 },
    End(u64),
    Submit { cmd: u64, wait: u64, signal: u64, fence: u64, completes_at: u64 },
    Present { image_index: u32, wait: u64 },
    CreateSwapchain { image_count: u32, extent: (u32, u32) },
    Destroy(Kind, u64),
}

#[derive(Clone, Copy, Debug)]
pub struct MockConfig {
    pub min_image_count: u32,
    pub max_image_count: u32,
    pub gpu_latency_ns: u64,
    /// `None` lets the swapchain pick (surface reports `u32::MAX`).
    pub current_extent: Option<RenderSize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            min_image_count: 2,
            max_image_count: 0,
            gpu_latency_ns: 5 * MS,
            current_extent: None,
        }
    }
}

struct FenceState {
    signaled: bool,
    completes_at: Option<u64>,
    cmd: Option<u64>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Recording {
    Initial,
    Recording,
    Executable,
}

struct State {
    cfg: MockConfig,
    next_handle: u64,
    clock: u64,
    busy_until: u64,

    live: HashMap<u64, Kind>,
    fences: HashMap<u64, FenceState>,
    signaled_sems: HashSet<u64>,
    cmd_pool: HashMap<u64, u64>,
    cmd_state: HashMap<u64, Recording>,
    in_flight_cmds: HashSet<u64>,

    swapchain: u64,
    images: Vec<u64>,
    extent: (u32, u32),
    next_image: u32,
    swapchains_created: usize,
    stale: bool,
    suboptimal_acquires: u32,
    fail_next_submit: Option<vk::Result>,

    submissions: usize,
    calls: Vec<Call>,
    violations: Vec<String>,
}

impl State {
    fn handle(&mut self, kind: Kind) -> u64 {
        self.next_handle += 1;
        let h = self.next_handle;
        self.live.insert(h, kind);
        h
    }

    /// Signals every fence whose submission has finished by now.
    fn settle(&mut self) {
        let now = self.clock;
        for fence in self.fences.values_mut() {
            if let Some(t) = fence.completes_at {
                if t <= now {
                    fence.signaled = true;
                    fence.completes_at = None;
                    if let Some(cmd) = fence.cmd.take() {
                        self.in_flight_cmds.remove(&cmd);
                    }
                }
            }
        }
    }

    fn destroy(&mut self, kind: Kind, h: u64) {
        self.calls.push(Call::Destroy(kind, h));
        match self.live.remove(&h) {
            Some(k) if k == kind => {}
            Some(k) => self
                .violations
                .push(format!("destroyed {h} as {kind:?} but it is a {k:?}")),
            None => self
                .violations
                .push(format!("{kind:?} {h} destroyed twice or never created")),
        }
    }

    fn violation(&mut self, msg: String) {
        self.violations.push(msg);
    }
}

pub struct MockDevice {
    state: RefCell<State>,
}

impl MockDevice {
    pub fn new(cfg: MockConfig) -> Arc<Self> {
        Arc::new(Self {
            state: RefCell::new(State {
                cfg,
                next_handle: 0,
                clock: 0,
                busy_until: 0,
                live: HashMap::new(),
                fences: HashMap::new(),
                signaled_sems: HashSet::new(),
                cmd_pool: HashMap::new(),
                cmd_state: HashMap::new(),
                in_flight_cmds: HashSet::new(),
                swapchain: 0,
                images: Vec::new(),
                extent: (0, 0),
                next_image: 0,
                swapchains_created: 0,
                stale: false,
                suboptimal_acquires: 0,
                fail_next_submit: None,
                submissions: 0,
                calls: Vec::new(),
                violations: Vec::new(),
            }),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(MockConfig::default())
    }

    // --- knobs ---

    pub fn advance(&self, ns: u64) {
        let mut s = self.state.borrow_mut();
        s.clock += ns;
        s.settle();
    }

    pub fn set_gpu_latency(&self, ns: u64) {
        self.state.borrow_mut().cfg.gpu_latency_ns = ns;
    }

    /// Every acquire reports out-of-date until the next swapchain is built.
    pub fn invalidate_surface(&self) {
        self.state.borrow_mut().stale = true;
    }

    pub fn suboptimal_next_acquires(&self, n: u32) {
        self.state.borrow_mut().suboptimal_acquires = n;
    }

    pub fn fail_next_submit(&self, result: vk::Result) {
        self.state.borrow_mut().fail_next_submit = Some(result);
    }

    // --- inspection ---

    pub fn clock(&self) -> u64 {
        self.state.borrow().clock
    }

    pub fn submissions(&self) -> usize {
        self.state.borrow().submissions
    }

    pub fn swapchains_created(&self) -> usize {
        self.state.borrow().swapchains_created
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.borrow().violations.clone()
    }

    pub fn live(&self, kind: Kind) -> usize {
        self.state.borrow().live.values().filter(|&&k| k == kind).count()
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        let mut s = self.state.borrow_mut();
        s.settle();
        s.fences.get(&fence.as_raw()).is_some_and(|f| f.signaled)
    }

    pub fn swapchain_image(&self, index: usize) -> vk::Image {
        vk::Image::from_raw(self.state.borrow().images[index])
    }

    pub fn assert_clean(&self) {
        let v = self.violations();
        assert!(v.is_empty(), "GPU misuse: {v:#?}");
    }
}

impl GpuDevice for MockDevice {
    fn queue_family_index(&self) -> u32 {
        0
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::WaitIdle);
        s.clock = s.clock.max(s.busy_until);
        s.settle();
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state.borrow_mut();
        let h = s.handle(Kind::Fence);
        s.fences.insert(
            h,
            FenceState {
                signaled,
                completes_at: None,
                cmd: None,
            },
        );
        Ok(vk::Fence::from_raw(h))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.state.borrow_mut();
        let h = fence.as_raw();
        if s.fences.get(&h).is_some_and(|f| f.completes_at.is_some()) {
            s.violation(format!("fence {h} destroyed while its submission runs"));
        }
        s.fences.remove(&h);
        s.destroy(Kind::Fence, h);
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.settle();
        let h = fence.as_raw();
        let (signaled, completes_at) = match s.fences.get(&h) {
            Some(f) => (f.signaled, f.completes_at),
            None => {
                s.violation(format!("wait on unknown fence {h}"));
                return Err(vk::Result::ERROR_DEVICE_LOST);
            }
        };

        let result = if signaled {
            Ok(())
        } else {
            match completes_at {
                Some(t) if t.saturating_sub(s.clock) <= timeout_ns => {
                    s.clock = s.clock.max(t);
                    s.settle();
                    Ok(())
                }
                _ => {
                    s.clock += timeout_ns;
                    s.settle();
                    Err(vk::Result::TIMEOUT)
                }
            }
        };
        let at_ns = s.clock;
        s.calls.push(Call::WaitFence {
            fence: h,
            at_ns,
            timed_out: result.is_err(),
        });
        result
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.settle();
        let h = fence.as_raw();
        s.calls.push(Call::ResetFence(h));
        let pending = s.fences.get(&h).is_some_and(|f| f.completes_at.is_some());
        if pending {
            s.violation(format!("fence {h} reset while in use by the queue"));
        }
        if let Some(f) = s.fences.get_mut(&h) {
            f.signaled = false;
        }
        Ok(())
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut s = self.state.borrow_mut();
        Ok(vk::Semaphore::from_raw(s.handle(Kind::Semaphore)))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut s = self.state.borrow_mut();
        let h = semaphore.as_raw();
        s.signaled_sems.remove(&h);
        s.destroy(Kind::Semaphore, h);
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        let mut s = self.state.borrow_mut();
        Ok(vk::CommandPool::from_raw(s.handle(Kind::CommandPool)))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut s = self.state.borrow_mut();
        s.settle();
        let h = pool.as_raw();
        let cmds: Vec<u64> = s
            .cmd_pool
            .iter()
            .filter(|(_, &p)| p == h)
            .map(|(&c, _)| c)
            .collect();
        for cmd in cmds {
            if s.in_flight_cmds.contains(&cmd) {
                s.violation(format!("pool {h} destroyed while command buffer {cmd} runs"));
            }
            s.cmd_pool.remove(&cmd);
            s.cmd_state.remove(&cmd);
        }
        s.destroy(Kind::CommandPool, h);
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let mut s = self.state.borrow_mut();
        s.next_handle += 1;
        let h = s.next_handle;
        s.cmd_pool.insert(h, pool.as_raw());
        s.cmd_state.insert(h, Recording::Initial);
        Ok(vk::CommandBuffer::from_raw(h))
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.settle();
        let h = cmd.as_raw();
        let at_ns = s.clock;
        s.calls.push(Call::ResetCommandBuffer { cmd: h, at_ns });
        if s.in_flight_cmds.contains(&h) {
            s.violation(format!("command buffer {h} reset while the GPU still uses it"));
        }
        s.cmd_state.insert(h, Recording::Initial);
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        let h = cmd.as_raw();
        s.calls.push(Call::Begin(h));
        if s.cmd_state.get(&h) != Some(&Recording::Initial) {
            s.violation(format!("begin on command buffer {h} that was not reset"));
        }
        s.cmd_state.insert(h, Recording::Recording);
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        let h = cmd.as_raw();
        s.calls.push(Call::End(h));
        if s.cmd_state.get(&h) != Some(&Recording::Recording) {
            s.violation(format!("end on command buffer {h} that is not recording"));
        }
        s.cmd_state.insert(h, Recording::Executable);
        Ok(())
    }

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &vk::ImageMemoryBarrier2<'_>) {
        let mut s = self.state.borrow_mut();
        if s.cmd_state.get(&cmd.as_raw()) != Some(&Recording::Recording) {
            s.violation("barrier recorded outside a recording session".to_owned());
        }
        s.calls.push(Call::Barrier {
            image: barrier.image.as_raw(),
            old: barrier.old_layout,
            new: barrier.new_layout,
        });
    }

    fn cmd_clear_color(&self, cmd: vk::CommandBuffer, image: vk::Image, _rgba: [f32; 4]) {
        let mut s = self.state.borrow_mut();
        if s.cmd_state.get(&cmd.as_raw()) != Some(&Recording::Recording) {
            s.violation("clear recorded outside a recording session".to_owned());
        }
        s.calls.push(Call::Clear {
            image: image.as_raw(),
        });
    }

    fn queue_submit(&self, submission: &Submission, fence: vk::Fence) -> VkResult<()> {
        let mut s = self.state.borrow_mut();
        s.settle();
        if let Some(result) = s.fail_next_submit.take() {
            return Err(result);
        }

        let cmd = submission.command_buffer.as_raw();
        let wait = submission.wait_semaphore.as_raw();
        let signal = submission.signal_semaphore.as_raw();
        let f = fence.as_raw();

        if s.cmd_state.get(&cmd) != Some(&Recording::Executable) {
            s.violation(format!("submitted command buffer {cmd} that is not fully recorded"));
        }
        if !s.signaled_sems.remove(&wait) {
            s.violation(format!("submit waits on semaphore {wait} nothing will signal"));
        }
        if !s.signaled_sems.insert(signal) {
            s.violation(format!("submit signals semaphore {signal} that is already signalled"));
        }
        let busy = s
            .fences
            .get(&f)
            .map_or(true, |st| st.signaled || st.completes_at.is_some());
        if busy {
            s.violation(format!("submit with fence {f} that is signalled or in use"));
        }

        let completes_at = s.clock.max(s.busy_until) + s.cfg.gpu_latency_ns;
        s.busy_until = completes_at;
        if let Some(st) = s.fences.get_mut(&f) {
            st.completes_at = Some(completes_at);
            st.cmd = Some(cmd);
        }
        s.in_flight_cmds.insert(cmd);
        s.submissions += 1;
        s.calls.push(Call::Submit {
            cmd,
            wait,
            signal,
            fence: f,
            completes_at,
        });
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut s = self.state.borrow_mut();
        let w = wait.as_raw();
        s.calls.push(Call::Present { image_index, wait: w });
        if swapchain.as_raw() != s.swapchain {
            s.violation("present on a dead swapchain".to_owned());
        }
        if !s.signaled_sems.remove(&w) {
            s.violation(format!("present waits on semaphore {w} nothing will signal"));
        }
        if s.stale {
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }
        Ok(false)
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let s = self.state.borrow();
        let current_extent = match s.cfg.current_extent {
            Some(size) => vk::Extent2D {
                width: size.width,
                height: size.height,
            },
            None => vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
        };
        Ok(vk::SurfaceCapabilitiesKHR {
            min_image_count: s.cfg.min_image_count,
            max_image_count: s.cfg.max_image_count,
            current_extent,
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 8192,
                height: 8192,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
        })
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ])
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO])
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let mut s = self.state.borrow_mut();
        if s.swapchain != 0 {
            s.violation("swapchain created while another is live".to_owned());
        }
        if desc.present_mode != vk::PresentModeKHR::FIFO {
            s.violation(format!("unexpected present mode {:?}", desc.present_mode));
        }
        let h = s.handle(Kind::Swapchain);
        let count = desc.min_image_count;
        let images = (0..count)
            .map(|_| {
                s.next_handle += 1;
                s.next_handle
            })
            .collect();
        s.swapchain = h;
        s.images = images;
        s.extent = (desc.extent.width, desc.extent.height);
        s.next_image = 0;
        s.stale = false;
        s.swapchains_created += 1;
        s.calls.push(Call::CreateSwapchain {
            image_count: count,
            extent: (desc.extent.width, desc.extent.height),
        });
        Ok(vk::SwapchainKHR::from_raw(h))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut s = self.state.borrow_mut();
        let h = swapchain.as_raw();
        let views_alive = s.live.values().any(|&k| k == Kind::ImageView);
        if views_alive {
            s.violation("swapchain destroyed before its image views".to_owned());
        }
        if s.swapchain == h {
            s.swapchain = 0;
            s.images.clear();
        }
        s.destroy(Kind::Swapchain, h);
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let s = self.state.borrow();
        assert_eq!(swapchain.as_raw(), s.swapchain);
        Ok(s.images.iter().map(|&h| vk::Image::from_raw(h)).collect())
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        let mut s = self.state.borrow_mut();
        Ok(vk::ImageView::from_raw(s.handle(Kind::ImageView)))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut s = self.state.borrow_mut();
        s.destroy(Kind::ImageView, view.as_raw());
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state.borrow_mut();
        let sem = signal.as_raw();
        if swapchain.as_raw() != s.swapchain || s.swapchain == 0 {
            s.violation("acquire on a dead swapchain".to_owned());
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        }
        if s.stale {
            s.calls.push(Call::Acquire {
                semaphore: sem,
                image_index: None,
            });
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }
        if !s.signaled_sems.insert(sem) {
            s.violation(format!("acquire signals semaphore {sem} that is already signalled"));
        }
        let index = s.next_image;
        s.next_image = (index + 1) % s.images.len() as u32;
        s.calls.push(Call::Acquire {
            semaphore: sem,
            image_index: Some(index),
        });
        let suboptimal = s.suboptimal_acquires > 0;
        if suboptimal {
            s.suboptimal_acquires -= 1;
        }
        Ok((index, suboptimal))
    }
}

/// Draw callback that records nothing.
pub fn no_draw<D: GpuDevice>(_: &cadence_render_vk::RecordContext<'_, D>) -> anyhow::Result<()> {
    Ok(())
}

pub fn size(width: u32, height: u32) -> RenderSize {
    RenderSize { width, height }
}
