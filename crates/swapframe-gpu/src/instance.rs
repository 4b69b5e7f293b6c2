//! Vulkan instance creation and physical device selection.

use std::ffi::{CStr, CString};

use ash::vk;
use raw_window_handle::RawDisplayHandle;
use swapframe_core::constants::{MAX_DEVICE_COUNT, MAX_QUEUE_COUNT};
use swapframe_core::bit_ffs32;

use crate::error::{GpuError, Result};
use crate::surface::SurfaceContext;

/// Khronos validation layer.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// A loaded Vulkan entry point and instance.
pub struct GpuInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    validation: bool,
}

impl GpuInstance {
    /// The Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// The Vulkan instance.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Whether the validation layer ended up enabled.
    pub fn validation_enabled(&self) -> bool {
        self.validation
    }

    /// Destroy the instance.
    ///
    /// # Safety
    /// Every surface and device created from this instance must be destroyed.
    pub unsafe fn destroy(&self) {
        self.instance.destroy_instance(None);
        tracing::debug!("Destroyed Vulkan instance");
    }
}

/// Builder for a [`GpuInstance`].
pub struct GpuInstanceBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuInstanceBuilder {
    fn default() -> Self {
        Self {
            app_name: "swapframe".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuInstanceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Try to enable the validation layer.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Load Vulkan and create an instance able to present to `display`.
    ///
    /// A missing or failing validation layer is logged and skipped.
    pub fn build(self, display: RawDisplayHandle) -> Result<GpuInstance> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Provisioning(format!("Failed to load Vulkan: {e}")))?;

        let app_name = CString::new(self.app_name)
            .map_err(|e| GpuError::Provisioning(format!("Invalid application name: {e}")))?;

        let extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| GpuError::Provisioning(format!("No surface extensions: {e}")))?;

        let mut validation =
            self.enable_validation && unsafe { layer_available(&entry, VALIDATION_LAYER)? };
        if self.enable_validation && !validation {
            tracing::warn!("Validation layer {:?} not available", VALIDATION_LAYER);
        }

        let instance = match unsafe { create_instance(&entry, &app_name, extensions, validation) } {
            Ok(instance) => instance,
            Err(e) if validation => {
                tracing::warn!("Instance creation with validation failed ({e}), retrying without");
                validation = false;
                unsafe { create_instance(&entry, &app_name, extensions, false) }?
            }
            Err(e) => return Err(GpuError::Provisioning(format!("vkCreateInstance: {e}"))),
        };

        tracing::info!(
            "Created Vulkan instance (validation {})",
            if validation { "on" } else { "off" }
        );

        Ok(GpuInstance {
            entry,
            instance,
            validation,
        })
    }
}

unsafe fn layer_available(entry: &ash::Entry, layer: &CStr) -> Result<bool> {
    let available = entry.enumerate_instance_layer_properties()?;
    Ok(available
        .iter()
        .any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == layer)))
}

unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &CStr,
    extensions: &[*const std::ffi::c_char],
    validation: bool,
) -> Result<ash::Instance> {
    let app_info = vk::ApplicationInfo::default()
        .application_name(app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"swapframe")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    let layer_names = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    };

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(extensions)
        .enabled_layer_names(&layer_names);

    Ok(entry.create_instance(&create_info, None)?)
}

/// A physical device able to draw and present to a surface.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCandidate {
    pub physical_device: vk::PhysicalDevice,
    /// Queue family supporting both graphics and presentation.
    pub queue_family: u32,
    pub score: i32,
}

/// Select the best physical device that can present to `surface`.
///
/// At most [`MAX_DEVICE_COUNT`] devices and [`MAX_QUEUE_COUNT`] queue
/// families per device are inspected.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn select_physical_device(
    instance: &GpuInstance,
    surface: &SurfaceContext,
) -> Result<DeviceCandidate> {
    let devices = instance.instance().enumerate_physical_devices()?;
    if devices.len() > MAX_DEVICE_COUNT {
        tracing::debug!(
            "{} physical devices reported, inspecting the first {}",
            devices.len(),
            MAX_DEVICE_COUNT
        );
    }

    let mut best: Option<DeviceCandidate> = None;
    for physical_device in devices.into_iter().take(MAX_DEVICE_COUNT) {
        let Some(queue_family) = find_present_family(instance, surface, physical_device)? else {
            continue;
        };

        let score = score_physical_device(instance.instance(), physical_device);
        if best.map_or(true, |b| score > b.score) {
            best = Some(DeviceCandidate {
                physical_device,
                queue_family,
                score,
            });
        }
    }

    best.ok_or(GpuError::NoSuitableDevice)
}

/// First queue family with graphics support that can present to the surface.
unsafe fn find_present_family(
    instance: &GpuInstance,
    surface: &SurfaceContext,
    physical_device: vk::PhysicalDevice,
) -> Result<Option<u32>> {
    let families = instance
        .instance()
        .get_physical_device_queue_family_properties(physical_device);

    for (i, family) in families.iter().take(MAX_QUEUE_COUNT).enumerate() {
        let i = i as u32;
        tracing::trace!("Queue family {i}: {}", queue_flag_names(family.queue_flags));

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && surface.supports_present(physical_device, i)?
        {
            return Ok(Some(i));
        }
    }

    Ok(None)
}

fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i32 {
    let properties = unsafe { instance.get_physical_device_properties(device) };

    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    }
}

/// Human-readable list of the set queue flags, lowest bit first.
pub fn queue_flag_names(flags: vk::QueueFlags) -> String {
    let mut bits = flags.as_raw();
    let mut names = Vec::new();

    while bits != 0 {
        let bit = 1 << bit_ffs32(bits);
        names.push(match vk::QueueFlags::from_raw(bit) {
            vk::QueueFlags::GRAPHICS => "GRAPHICS".to_string(),
            vk::QueueFlags::COMPUTE => "COMPUTE".to_string(),
            vk::QueueFlags::TRANSFER => "TRANSFER".to_string(),
            vk::QueueFlags::SPARSE_BINDING => "SPARSE_BINDING".to_string(),
            vk::QueueFlags::PROTECTED => "PROTECTED".to_string(),
            _ => format!("{bit:#x}"),
        });
        bits &= bits - 1;
    }

    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_flags_listed_lowest_first() {
        let flags = vk::QueueFlags::TRANSFER | vk::QueueFlags::GRAPHICS;
        assert_eq!(queue_flag_names(flags), "GRAPHICS | TRANSFER");
    }

    #[test]
    fn unknown_queue_flags_are_hex() {
        let flags = vk::QueueFlags::COMPUTE | vk::QueueFlags::from_raw(0x100);
        assert_eq!(queue_flag_names(flags), "COMPUTE | 0x100");
    }

    #[test]
    fn empty_queue_flags() {
        assert_eq!(queue_flag_names(vk::QueueFlags::empty()), "none");
    }
}
