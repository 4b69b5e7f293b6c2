//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Instance, surface or device provisioning failed.
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// No suitable GPU found.
    #[error("No GPU with a graphics queue that can present to the surface")]
    NoSuitableDevice,

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A frame slot's fence did not signal within the configured timeout.
    #[error("Fence of frame slot {slot} not signaled within {timeout_ns} ns")]
    FenceTimeout { slot: usize, timeout_ns: u64 },

    /// Acquiring the next swapchain image failed.
    #[error("Failed to acquire swapchain image: {0}")]
    AcquireFailure(vk::Result),

    /// No swapchain image became available within the configured timeout.
    #[error("No swapchain image available within {timeout_ns} ns")]
    AcquireTimeout { timeout_ns: u64 },

    /// Recording the frame body failed.
    #[error("Failed to record frame commands: {0}")]
    RecordFailure(String),

    /// Submitting the frame's command buffer failed.
    #[error("Failed to submit frame commands: {0}")]
    SubmitFailure(vk::Result),

    /// Presenting the frame's image failed.
    #[error("Failed to present swapchain image: {0}")]
    PresentFailure(vk::Result),

    /// The frame engine stopped after an earlier fatal failure.
    #[error("Frame loop halted after a fatal error: {0}")]
    Halted(String),

    /// Resources were created or destroyed out of dependency order.
    #[error("Teardown order violated: {0}")]
    TeardownOrder(String),

    /// Core error (precondition or capacity).
    #[error(transparent)]
    Core(#[from] swapframe_core::Error),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl GpuError {
    /// Returns true if the frame loop may retry after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FenceTimeout { .. } | Self::AcquireTimeout { .. }
        )
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
