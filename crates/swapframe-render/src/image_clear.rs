//! Clear the swapchain image directly with transfer commands.
//!
//! No render pass is involved. The image is moved to
//! `TRANSFER_DST_OPTIMAL`, cleared, then moved to `PRESENT_SRC_KHR`. The
//! submission waits for the acquired image at the transfer stage.

use ash::vk;
use swapframe_gpu::{FrameBody, FrameContext, GpuError, Result, Swapchain, VulkanBackend};

use crate::{FrameStrategy, CLEAR_COLOR, COLOR_SUBRESOURCE_RANGE};

pub struct ImageClear {
    color: vk::ClearColorValue,
}

impl ImageClear {
    /// Fails unless the swapchain images were created with `TRANSFER_DST` usage.
    pub fn new(swapchain: &Swapchain) -> Result<Self> {
        if !swapchain.usage.contains(vk::ImageUsageFlags::TRANSFER_DST) {
            return Err(GpuError::SwapchainCreation(
                "surface does not support TRANSFER_DST swapchain images".into(),
            ));
        }

        Ok(Self {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        })
    }

    /// Barrier taking a freshly acquired image to `TRANSFER_DST_OPTIMAL`.
    pub fn to_transfer_barrier(image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(COLOR_SUBRESOURCE_RANGE)
    }

    /// Barrier handing the cleared image to presentation.
    pub fn to_present_barrier(image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::empty())
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(COLOR_SUBRESOURCE_RANGE)
    }
}

impl FrameBody<VulkanBackend<'_>> for ImageClear {
    fn wait_stage(&self) -> vk::PipelineStageFlags {
        vk::PipelineStageFlags::TRANSFER
    }

    fn record(&mut self, backend: &VulkanBackend<'_>, frame: &FrameContext) -> Result<()> {
        let device = backend.device();
        let cmd = frame.command_buffer;

        unsafe {
            // Source stage matches the semaphore wait stage so the layout
            // change happens after the image is acquired.
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[Self::to_transfer_barrier(frame.image)],
            );

            device.cmd_clear_color_image(
                cmd,
                frame.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &self.color,
                &[COLOR_SUBRESOURCE_RANGE],
            );

            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[Self::to_present_barrier(frame.image)],
            );
        }
        Ok(())
    }
}

impl FrameStrategy for ImageClear {
    fn name(&self) -> &'static str {
        "image-clear"
    }

    fn uses_render_targets(&self) -> bool {
        false
    }

    unsafe fn destroy(&mut self, _device: &ash::Device) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn barriers_chain_layouts() {
        let image = vk::Image::from_raw(0x42);
        let first = ImageClear::to_transfer_barrier(image);
        let second = ImageClear::to_present_barrier(image);

        assert_eq!(first.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(first.new_layout, second.old_layout);
        assert_eq!(second.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(first.dst_access_mask, second.src_access_mask);
        assert_eq!(first.image, image);
        assert_eq!(second.image, image);
    }

    #[test]
    fn barriers_cover_the_color_aspect() {
        let barrier = ImageClear::to_transfer_barrier(vk::Image::null());
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(barrier.subresource_range.layer_count, 1);
    }
}
