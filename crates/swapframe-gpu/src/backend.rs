//! The GPU operations the frame engine is built on.
//!
//! [`FrameBackend`] is the only way the [`FrameEngine`](crate::FrameEngine)
//! touches the device, the queue and the swapchain. [`VulkanBackend`] forwards
//! every call to Vulkan; tests drive the engine through a scripted mock instead.
//!
//! All methods report raw `vk::Result` codes. The engine decides how each
//! failure is classified (acquire, submit, present, timeout).

use ash::prelude::VkResult;
use ash::vk;

use crate::command;
use crate::context::GpuContext;
use crate::swapchain::Swapchain;
use crate::sync;

/// A swapchain image handed out by an acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index into the swapchain's image set.
    pub index: u32,
    /// The surface no longer matches the swapchain exactly.
    pub suboptimal: bool,
}

/// Device, queue and swapchain operations used by the frame loop.
///
/// Destroy methods are `unsafe`: the caller guarantees no pending GPU work
/// still references the object.
pub trait FrameBackend {
    /// Create a command pool for the presentation queue family.
    fn create_command_pool(&mut self) -> VkResult<vk::CommandPool>;

    /// Allocate `count` primary command buffers from `pool`.
    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;

    /// Create a fence, optionally already signaled.
    fn create_fence(&mut self, signaled: bool) -> VkResult<vk::Fence>;

    /// Create a binary semaphore.
    fn create_semaphore(&mut self) -> VkResult<vk::Semaphore>;

    /// Non-blocking fence status query.
    fn fence_signaled(&mut self, fence: vk::Fence) -> VkResult<bool>;

    /// Block until `fence` is signaled; `Err(vk::Result::TIMEOUT)` on expiry.
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;

    /// Return `fence` to the unsignaled state.
    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()>;

    /// Acquire the next presentable image; `signal` fires once it is writable.
    fn acquire_next_image(
        &mut self,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> VkResult<AcquiredImage>;

    /// Reset `cmd` and begin a one-time-submit recording.
    fn begin_commands(&mut self, cmd: vk::CommandBuffer) -> VkResult<()>;

    /// Finish recording `cmd`.
    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> VkResult<()>;

    /// Submit `cmd`: wait on `wait` at `wait_stage`, then signal `signal` and `fence`.
    fn submit(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()>;

    /// Queue `image_index` for display once `wait` is signaled.
    ///
    /// Returns true if the presentation was suboptimal.
    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VkResult<bool>;

    /// Number of images in the swapchain.
    fn image_count(&self) -> u32;

    /// Image handle for a swapchain index.
    fn swapchain_image(&self, index: u32) -> Option<vk::Image>;

    /// Extent shared by all swapchain images.
    fn extent(&self) -> vk::Extent2D;

    /// Block until the device has no outstanding work.
    fn wait_idle(&mut self) -> VkResult<()>;

    /// Destroy a fence.
    ///
    /// # Safety
    /// No pending submission may signal `fence`.
    unsafe fn destroy_fence(&mut self, fence: vk::Fence);

    /// Destroy a semaphore.
    ///
    /// # Safety
    /// No pending operation may wait on or signal `semaphore`.
    unsafe fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);

    /// Destroy a command pool, freeing its command buffers.
    ///
    /// # Safety
    /// None of the pool's command buffers may be pending.
    unsafe fn destroy_command_pool(&mut self, pool: vk::CommandPool);
}

/// [`FrameBackend`] over a real Vulkan device and swapchain.
#[derive(Clone, Copy)]
pub struct VulkanBackend<'a> {
    gpu: &'a GpuContext,
    swapchain: &'a Swapchain,
}

impl<'a> VulkanBackend<'a> {
    /// Borrow a device and a swapchain for frame work.
    ///
    /// # Safety
    /// The swapchain must have been created from `gpu`'s device, and both must
    /// outlive every object created through this backend.
    pub unsafe fn new(gpu: &'a GpuContext, swapchain: &'a Swapchain) -> Self {
        Self { gpu, swapchain }
    }

    /// The logical device, for recording commands.
    pub fn device(&self) -> &'a ash::Device {
        self.gpu.device()
    }

    /// The provisioned GPU context.
    pub fn gpu(&self) -> &'a GpuContext {
        self.gpu
    }

    /// The swapchain frames are presented to.
    pub fn swapchain(&self) -> &'a Swapchain {
        self.swapchain
    }
}

impl FrameBackend for VulkanBackend<'_> {
    fn create_command_pool(&mut self) -> VkResult<vk::CommandPool> {
        unsafe { command::create_command_pool(self.device(), self.gpu.queue_family()) }
    }

    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe { command::allocate_command_buffers(self.device(), pool, count) }
    }

    fn create_fence(&mut self, signaled: bool) -> VkResult<vk::Fence> {
        unsafe { sync::create_fence(self.device(), signaled) }
    }

    fn create_semaphore(&mut self) -> VkResult<vk::Semaphore> {
        unsafe { sync::create_semaphore(self.device()) }
    }

    fn fence_signaled(&mut self, fence: vk::Fence) -> VkResult<bool> {
        unsafe { sync::fence_status(self.device(), fence) }
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { sync::wait_for_fence(self.device(), fence, timeout_ns) }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        unsafe { sync::reset_fence(self.device(), fence) }
    }

    fn acquire_next_image(
        &mut self,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> VkResult<AcquiredImage> {
        let (index, suboptimal) = unsafe {
            self.swapchain
                .acquire_next_image(self.gpu.swapchain_loader(), signal, timeout_ns)?
        };
        Ok(AcquiredImage { index, suboptimal })
    }

    fn begin_commands(&mut self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            command::begin_command_buffer(
                self.device(),
                cmd,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )
        }
    }

    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { command::end_command_buffer(self.device(), cmd) }
    }

    fn submit(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        unsafe {
            command::submit_command_buffers(
                self.device(),
                self.gpu.queue(),
                &[cmd],
                &[wait],
                &[wait_stage],
                &[signal],
                fence,
            )
        }
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VkResult<bool> {
        unsafe {
            self.swapchain.present(
                self.gpu.swapchain_loader(),
                self.gpu.queue(),
                image_index,
                &[wait],
            )
        }
    }

    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    fn swapchain_image(&self, index: u32) -> Option<vk::Image> {
        self.swapchain.images.get(index as usize).copied()
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    fn wait_idle(&mut self) -> VkResult<()> {
        unsafe { self.device().device_wait_idle() }
    }

    unsafe fn destroy_fence(&mut self, fence: vk::Fence) {
        self.device().destroy_fence(fence, None);
    }

    unsafe fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.device().destroy_semaphore(semaphore, None);
    }

    unsafe fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        self.device().destroy_command_pool(pool, None);
    }
}
