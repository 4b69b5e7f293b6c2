//! Fullscreen triangle drawn inside the render pass.

use ash::vk;
use swapframe_gpu::{
    FrameBody, FrameContext, GraphicsPipeline, GraphicsPipelineConfig, Result, Swapchain,
    VulkanBackend,
};

use crate::targets::RenderTargets;
use crate::{clear_value, FrameStrategy};

pub struct TrianglePass {
    targets: RenderTargets,
    pipeline: GraphicsPipeline,
}

impl TrianglePass {
    /// # Safety
    /// The device must be valid and own the swapchain.
    pub unsafe fn new(device: &ash::Device, swapchain: &Swapchain) -> Result<Self> {
        let mut targets = RenderTargets::new(device, swapchain)?;

        let pipeline = Self::create_pipeline(device, targets.render_pass);
        match pipeline {
            Ok(pipeline) => Ok(Self { targets, pipeline }),
            Err(e) => {
                targets.destroy(device);
                Err(e)
            }
        }
    }

    unsafe fn create_pipeline(
        device: &ash::Device,
        render_pass: vk::RenderPass,
    ) -> Result<GraphicsPipeline> {
        let config = GraphicsPipelineConfig {
            vertex_shader: swapframe_shaders::fullscreen_tri_vert()?.to_vec(),
            fragment_shader: swapframe_shaders::fullscreen_tri_frag()?.to_vec(),
            ..Default::default()
        };
        GraphicsPipeline::new(device, &config, render_pass)
    }
}

impl FrameBody<VulkanBackend<'_>> for TrianglePass {
    fn record(&mut self, backend: &VulkanBackend<'_>, frame: &FrameContext) -> Result<()> {
        let device = backend.device();
        let cmd = frame.command_buffer;

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: frame.extent.width as f32,
            height: frame.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: frame.extent,
        };

        unsafe {
            self.targets
                .begin(device, cmd, frame.image_index, clear_value())?;
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_render_pass(cmd);
        }
        Ok(())
    }
}

impl FrameStrategy for TrianglePass {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn uses_render_targets(&self) -> bool {
        true
    }

    unsafe fn destroy(&mut self, device: &ash::Device) {
        self.pipeline.destroy(device);
        self.targets.destroy(device);
    }
}
