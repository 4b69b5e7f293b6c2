//! Clear the swapchain image with an empty render pass.

use swapframe_gpu::{FrameBody, FrameContext, Result, Swapchain, VulkanBackend};

use crate::targets::RenderTargets;
use crate::{clear_value, FrameStrategy};

/// Begins and ends the render pass; the load op does the clearing.
pub struct ClearPass {
    targets: RenderTargets,
}

impl ClearPass {
    /// # Safety
    /// The device must be valid and own the swapchain.
    pub unsafe fn new(device: &ash::Device, swapchain: &Swapchain) -> Result<Self> {
        Ok(Self {
            targets: RenderTargets::new(device, swapchain)?,
        })
    }
}

impl FrameBody<VulkanBackend<'_>> for ClearPass {
    fn record(&mut self, backend: &VulkanBackend<'_>, frame: &FrameContext) -> Result<()> {
        let device = backend.device();
        unsafe {
            self.targets
                .begin(device, frame.command_buffer, frame.image_index, clear_value())?;
            device.cmd_end_render_pass(frame.command_buffer);
        }
        Ok(())
    }
}

impl FrameStrategy for ClearPass {
    fn name(&self) -> &'static str {
        "clear-pass"
    }

    fn uses_render_targets(&self) -> bool {
        true
    }

    unsafe fn destroy(&mut self, device: &ash::Device) {
        self.targets.destroy(device);
    }
}
