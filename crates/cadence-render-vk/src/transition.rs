// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::device::GpuDevice;

/// Depth layouts get the depth aspect, everything else is treated as colour.
pub fn aspect_for(new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Full-pipeline barrier moving `image` from `old_layout` to `new_layout`.
///
/// Waits on all prior commands and blocks all later ones. ALL_COMMANDS stalls
/// the pipeline; narrower stage masks per transition would be faster.
pub fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> vk::ImageMemoryBarrier2<'static> {
    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask: aspect_for(new_layout),
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    };

    vk::ImageMemoryBarrier2 {
        src_stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
        src_access_mask: vk::AccessFlags2::MEMORY_WRITE,
        dst_stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
        dst_access_mask: vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ,
        old_layout,
        new_layout,
        image,
        subresource_range,
        ..Default::default()
    }
}

/// Records a single layout transition into `cmd`.
#[inline]
pub fn transition_image<D: GpuDevice + ?Sized>(
    device: &D,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let barrier = layout_barrier(image, old_layout, new_layout);
    device.cmd_image_barrier(cmd, &barrier);
}
