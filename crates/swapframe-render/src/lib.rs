//! Frame body strategies for swapframe.
//!
//! This crate provides:
//! - Render targets (render pass, image views, framebuffers)
//! - A render-pass clear
//! - A barrier-based direct image clear
//! - A fullscreen triangle pipeline (`triangle` feature)

pub mod clear_pass;
pub mod image_clear;
pub mod targets;
#[cfg(feature = "triangle")]
pub mod triangle;

pub use clear_pass::ClearPass;
pub use image_clear::ImageClear;
pub use targets::RenderTargets;
#[cfg(feature = "triangle")]
pub use triangle::TrianglePass;

use ash::vk;
use swapframe_gpu::{FrameBody, VulkanBackend};

/// Background color of every variant.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.1, 0.2, 1.0];

/// A frame body that can be driven by the Vulkan backend and owns device
/// resources of its own.
pub trait FrameStrategy: for<'a> FrameBody<VulkanBackend<'a>> {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the strategy owns render targets (render pass, views, framebuffers).
    fn uses_render_targets(&self) -> bool;

    /// Release the strategy's device resources.
    ///
    /// # Safety
    /// The device must be idle and the swapchain must still exist.
    unsafe fn destroy(&mut self, device: &ash::Device);
}

pub(crate) fn clear_value() -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    }
}

pub(crate) const COLOR_SUBRESOURCE_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};
