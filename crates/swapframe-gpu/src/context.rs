//! Logical device and presentation queue.

use ash::vk;

use crate::error::{GpuError, Result};
use crate::instance::{select_physical_device, GpuInstance};
use crate::surface::SurfaceContext;

/// Device handle, the single present-capable queue and its family.
pub struct GpuContext {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    queue_family: u32,
    swapchain_loader: ash::khr::swapchain::Device,
    device_name: String,
}

impl GpuContext {
    /// Pick a physical device that can present to `surface` and create a
    /// logical device with one graphics+present queue.
    ///
    /// # Safety
    /// The instance and surface must be valid and outlive the context.
    pub unsafe fn new(instance: &GpuInstance, surface: &SurfaceContext) -> Result<Self> {
        let candidate = select_physical_device(instance, surface)?;

        let properties = instance
            .instance()
            .get_physical_device_properties(candidate.physical_device);
        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed>".to_string());

        tracing::info!(
            "Selected GPU: {} ({:?}), queue family {}",
            device_name,
            properties.device_type,
            candidate.queue_family
        );

        let queue_priority = 1.0_f32;
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(candidate.queue_family)
            .queue_priorities(std::slice::from_ref(&queue_priority))];

        let extension_names = [ash::khr::swapchain::NAME.as_ptr()];

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names);

        let device = instance
            .instance()
            .create_device(candidate.physical_device, &device_create_info, None)
            .map_err(|e| GpuError::Provisioning(format!("vkCreateDevice: {e}")))?;

        let queue = device.get_device_queue(candidate.queue_family, 0);
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.instance(), &device);

        Ok(Self {
            physical_device: candidate.physical_device,
            device,
            queue,
            queue_family: candidate.queue_family,
            swapchain_loader,
            device_name,
        })
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the graphics+present queue.
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Get the queue family index of [`Self::queue`].
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Swapchain extension functions.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }

    /// Destroy the logical device.
    ///
    /// # Safety
    /// The device must be idle and every object created from it destroyed.
    pub unsafe fn destroy(&self) {
        self.device.destroy_device(None);
        tracing::debug!("Destroyed logical device");
    }
}
