//! Synchronization primitives.

use ash::prelude::VkResult;
use ash::vk;

use crate::backend::FrameBackend;
use crate::error::Result;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> VkResult<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    device.create_semaphore(&create_info, None)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> VkResult<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    device.create_fence(&create_info, None)
}

/// Wait for a fence to be signaled.
///
/// Returns `Err(vk::Result::TIMEOUT)` if the timeout expires first.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout_ns: u64,
) -> VkResult<()> {
    device.wait_for_fences(&[fence], true, timeout_ns)
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid, and no pending submission may use the fence.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> VkResult<()> {
    device.reset_fences(&[fence])
}

/// Query whether a fence is signaled without blocking.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn fence_status(device: &ash::Device, fence: vk::Fence) -> VkResult<bool> {
    device.get_fence_status(fence)
}

/// Synchronization primitives owned by one frame slot.
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    /// Semaphore signaled when the acquired image is safe to write
    pub image_available: vk::Semaphore,
    /// Semaphore signaled when the slot's commands finished executing
    pub render_finished: vk::Semaphore,
    /// Fence signaled when the slot's submission retired; created signaled
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Create frame synchronization resources.
    ///
    /// The fence starts signaled so the first wait on a fresh slot returns
    /// immediately.
    pub fn new<B: FrameBackend + ?Sized>(backend: &mut B) -> Result<Self> {
        let image_available = backend.create_semaphore()?;

        let render_finished = match backend.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                // SAFETY: freshly created, never submitted
                unsafe { backend.destroy_semaphore(image_available) };
                return Err(e.into());
            }
        };

        let in_flight = match backend.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                // SAFETY: freshly created, never submitted
                unsafe {
                    backend.destroy_semaphore(render_finished);
                    backend.destroy_semaphore(image_available);
                }
                return Err(e.into());
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Destroy synchronization resources.
    ///
    /// # Safety
    /// No pending GPU work may reference these primitives.
    pub unsafe fn destroy<B: FrameBackend + ?Sized>(&self, backend: &mut B) {
        backend.destroy_fence(self.in_flight);
        backend.destroy_semaphore(self.render_finished);
        backend.destroy_semaphore(self.image_available);
    }
}
