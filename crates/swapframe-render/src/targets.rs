//! Render pass, image views and framebuffers over the swapchain images.

use ash::vk;
use smallvec::SmallVec;
use swapframe_core::constants::MAX_SWAPCHAIN_IMAGES;
use swapframe_gpu::{GpuError, Result, Swapchain};

use crate::COLOR_SUBRESOURCE_RANGE;

/// One framebuffer per swapchain image, sharing a single-subpass render pass.
pub struct RenderTargets {
    pub render_pass: vk::RenderPass,
    pub image_views: SmallVec<[vk::ImageView; MAX_SWAPCHAIN_IMAGES]>,
    pub framebuffers: SmallVec<[vk::Framebuffer; MAX_SWAPCHAIN_IMAGES]>,
    pub extent: vk::Extent2D,
}

/// The color attachment: cleared on load, stored, handed to presentation.
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// Orders the attachment write after the acquire semaphore wait, which
/// happens at the color-attachment-output stage.
pub fn acquire_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
}

impl RenderTargets {
    /// Create the render pass and per-image views and framebuffers.
    ///
    /// # Safety
    /// The device must be valid and own the swapchain.
    pub unsafe fn new(device: &ash::Device, swapchain: &Swapchain) -> Result<Self> {
        swapframe_core::Error::check_capacity(
            "swapchain image views",
            MAX_SWAPCHAIN_IMAGES,
            swapchain.images.len(),
        )?;

        let render_pass = create_render_pass(device, swapchain.format)?;
        let mut targets = Self {
            render_pass,
            image_views: SmallVec::new(),
            framebuffers: SmallVec::new(),
            extent: swapchain.extent,
        };

        if let Err(e) = targets.create_framebuffers(device, swapchain) {
            targets.destroy(device);
            return Err(e);
        }

        tracing::debug!(
            "Created render targets for {} swapchain images",
            targets.framebuffers.len()
        );
        Ok(targets)
    }

    unsafe fn create_framebuffers(&mut self, device: &ash::Device, swapchain: &Swapchain) -> Result<()> {
        for &image in &swapchain.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(swapchain.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(COLOR_SUBRESOURCE_RANGE);
            let view = device.create_image_view(&view_info, None)?;
            self.image_views.push(view);

            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            let framebuffer = device.create_framebuffer(&framebuffer_info, None)?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// Framebuffer of a swapchain image.
    pub fn framebuffer(&self, image_index: u32) -> Result<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                GpuError::RecordFailure(format!("no framebuffer for swapchain image {image_index}"))
            })
    }

    /// Begin the render pass on `image_index`, clearing to `clear`.
    ///
    /// # Safety
    /// `cmd` must be recording.
    pub unsafe fn begin(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        image_index: u32,
        clear: vk::ClearValue,
    ) -> Result<()> {
        let clear_values = [clear];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffer(image_index)?)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .clear_values(&clear_values);

        device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        Ok(())
    }

    /// Destroy framebuffers, views and the render pass.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer, None);
        }
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view, None);
        }
        if self.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(self.render_pass, None);
            self.render_pass = vk::RenderPass::null();
        }
    }
}

unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [color_attachment(format)];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];

    let dependencies = [acquire_dependency()];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    device
        .create_render_pass(&create_info, None)
        .map_err(|e| GpuError::PipelineCreation(format!("render pass: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_ends_presentable() {
        let attachment = color_attachment(vk::Format::B8G8R8A8_UNORM);
        assert_eq!(attachment.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn dependency_waits_at_color_output() {
        let dependency = acquire_dependency();
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        assert_eq!(
            dependency.src_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert!(dependency
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn missing_framebuffer_is_a_record_failure() {
        let targets = RenderTargets {
            render_pass: vk::RenderPass::null(),
            image_views: SmallVec::new(),
            framebuffers: SmallVec::new(),
            extent: vk::Extent2D::default(),
        };
        assert!(matches!(
            targets.framebuffer(0),
            Err(GpuError::RecordFailure(_))
        ));
    }
}
