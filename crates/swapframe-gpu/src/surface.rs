//! Presentation surface for a window.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use smallvec::SmallVec;
use swapframe_core::constants::MAX_PRESENT_MODE_COUNT;

use crate::error::{GpuError, Result};
use crate::instance::GpuInstance;

/// A Vulkan surface and the extension loader that owns its queries.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
}

impl SurfaceContext {
    /// Create a surface for `window`.
    ///
    /// # Safety
    /// The instance must be valid and must outlive the surface. The window
    /// must outlive the surface.
    pub unsafe fn from_window<W>(instance: &GpuInstance, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = ash_window::create_surface(
            instance.entry(),
            instance.instance(),
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.instance());
        tracing::debug!("Created window surface");

        Ok(Self {
            surface,
            surface_loader,
        })
    }

    /// Query capabilities, formats and present modes for a physical device.
    ///
    /// At most [`MAX_PRESENT_MODE_COUNT`] present modes are kept.
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceCapabilities> {
        unsafe {
            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)?;

            let all_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?;
            if all_modes.len() > MAX_PRESENT_MODE_COUNT {
                tracing::debug!(
                    "Surface reports {} present modes, keeping the first {}",
                    all_modes.len(),
                    MAX_PRESENT_MODE_COUNT
                );
            }

            Ok(SurfaceCapabilities {
                capabilities: caps,
                formats,
                present_modes: all_modes.into_iter().take(MAX_PRESENT_MODE_COUNT).collect(),
            })
        }
    }

    /// Whether `queue_family` on `physical_device` can present to this surface.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        let supported = unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family,
                self.surface,
            )?
        };
        Ok(supported)
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// No swapchain created from this surface may still exist.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
        tracing::debug!("Destroyed window surface");
    }
}

/// Surface capabilities query result.
#[derive(Debug, Clone)]
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats, in driver order.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes, in driver order.
    pub present_modes: SmallVec<[vk::PresentModeKHR; MAX_PRESENT_MODE_COUNT]>,
}
