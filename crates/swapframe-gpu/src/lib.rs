//! Vulkan provisioning and frame synchronization for swapframe.
//!
//! This crate provides:
//! - Vulkan instance, surface and device provisioning
//! - Swapchain negotiation and the presentable image pool
//! - Fence, semaphore and command buffer helpers
//! - The double-buffered frame synchronization engine
//! - Ordered construction and teardown tracking

pub mod backend;
pub mod command;
pub mod context;
pub mod error;
pub mod frame;
pub mod instance;
pub mod lifecycle;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use backend::{AcquiredImage, FrameBackend, VulkanBackend};
pub use context::GpuContext;
pub use error::{GpuError, Result};
pub use frame::{
    FrameBody, FrameConfig, FrameContext, FrameEngine, FrameStats, FrameStatus, PresentedFrame,
    ShutdownSignal, SlotState,
};
pub use instance::{GpuInstance, GpuInstanceBuilder};
pub use lifecycle::{Lifecycle, Stage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{negotiate, PresentPreference, Swapchain, SwapchainPlan};
pub use sync::FrameSync;
