//! Swapchain negotiation and the presentable image pool.

use ash::prelude::VkResult;
use ash::vk;
use smallvec::SmallVec;
use swapframe_core::constants::{
    MAX_SWAPCHAIN_IMAGES, PRESENT_MODE_DEFAULT_IMAGE_COUNT, PRESENT_MODE_MAILBOX_IMAGE_COUNT,
};

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::surface::{SurfaceCapabilities, SurfaceContext};

/// Format used when the surface reports no preference.
pub const FALLBACK_SURFACE_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// Which present mode to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentPreference {
    /// MAILBOX when the surface offers it, FIFO otherwise.
    #[default]
    LowLatency,
    /// Always FIFO (vsync).
    Fifo,
}

/// Everything needed to create a swapchain, decided from surface capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub usage: vk::ImageUsageFlags,
}

/// Decide format, present mode, image count and extent for a surface.
///
/// `width`/`height` are only used when the surface leaves the extent to the
/// application.
pub fn negotiate(
    caps: &SurfaceCapabilities,
    width: u32,
    height: u32,
    preference: PresentPreference,
) -> Result<SwapchainPlan> {
    let surface_format = select_surface_format(&caps.formats)?;
    let present_mode = select_present_mode(&caps.present_modes, preference);
    let image_count = select_image_count(&caps.capabilities, present_mode)?;
    let extent = calculate_extent(&caps.capabilities, width, height);

    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    if caps
        .capabilities
        .supported_usage_flags
        .contains(vk::ImageUsageFlags::TRANSFER_DST)
    {
        usage |= vk::ImageUsageFlags::TRANSFER_DST;
    }

    Ok(SwapchainPlan {
        surface_format,
        present_mode,
        image_count,
        extent,
        pre_transform: caps.capabilities.current_transform,
        usage,
    })
}

/// Take the first reported format, substituting a fixed one for `UNDEFINED`.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    let first = available
        .first()
        .copied()
        .ok_or_else(|| GpuError::SwapchainCreation("surface reports no formats".into()))?;

    if first.format == vk::Format::UNDEFINED {
        return Ok(vk::SurfaceFormatKHR {
            format: FALLBACK_SURFACE_FORMAT,
            color_space: first.color_space,
        });
    }

    Ok(first)
}

/// Select the present mode.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    preference: PresentPreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentPreference::LowLatency if available.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        // FIFO is always supported
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// Image count for a present mode, clamped to what the surface allows.
pub fn select_image_count(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    present_mode: vk::PresentModeKHR,
) -> Result<u32> {
    let desired = if present_mode == vk::PresentModeKHR::MAILBOX {
        PRESENT_MODE_MAILBOX_IMAGE_COUNT
    } else {
        PRESENT_MODE_DEFAULT_IMAGE_COUNT
    };

    let mut count = desired.max(capabilities.min_image_count);
    // max_image_count == 0 means no upper limit
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }

    swapframe_core::Error::check_capacity("swapchain images", MAX_SWAPCHAIN_IMAGES, count as usize)?;
    Ok(count)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// The negotiated presentable image set.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: SmallVec<[vk::Image; MAX_SWAPCHAIN_IMAGES]>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub usage: vk::ImageUsageFlags,
}

impl Swapchain {
    /// Create a swapchain from a negotiated plan.
    ///
    /// # Safety
    /// The GPU context and surface must be valid and belong to the same instance.
    pub unsafe fn new(
        gpu: &GpuContext,
        surface: &SurfaceContext,
        plan: &SwapchainPlan,
    ) -> Result<Self> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(plan.usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true);

        let loader = gpu.swapchain_loader();
        let swapchain = loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = match Self::collect_images(loader, swapchain) {
            Ok(images) => images,
            Err(e) => {
                loader.destroy_swapchain(swapchain, None);
                return Err(e);
            }
        };

        tracing::info!(
            "Created swapchain: {} images, {}x{}, {:?}, {:?}",
            images.len(),
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.present_mode,
        );

        Ok(Self {
            swapchain,
            images,
            format: plan.surface_format.format,
            extent: plan.extent,
            present_mode: plan.present_mode,
            usage: plan.usage,
        })
    }

    unsafe fn collect_images(
        loader: &ash::khr::swapchain::Device,
        swapchain: vk::SwapchainKHR,
    ) -> Result<SmallVec<[vk::Image; MAX_SWAPCHAIN_IMAGES]>> {
        let images = loader.get_swapchain_images(swapchain)?;
        swapframe_core::Error::check_capacity("swapchain images", MAX_SWAPCHAIN_IMAGES, images.len())?;
        Ok(images.into_iter().collect())
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Acquire the next image, signaling `semaphore` once it can be written.
    ///
    /// Returns the image index and whether the swapchain is suboptimal.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> VkResult<(u32, bool)> {
        // NOT_READY and TIMEOUT come back as Err; no image was acquired
        swapchain_loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            semaphore,
            vk::Fence::null(),
        )
    }

    /// Present an image.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> VkResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        swapchain_loader.queue_present(queue, &present_info)
    }

    /// Destroy the swapchain.
    ///
    /// # Safety
    /// No pending GPU work may reference the swapchain images.
    pub unsafe fn destroy(&self, swapchain_loader: &ash::khr::swapchain::Device) {
        swapchain_loader.destroy_swapchain(self.swapchain, None);
        tracing::debug!("Destroyed swapchain");
    }
}
