//! Application configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use swapframe_gpu::{FrameConfig, PresentPreference};

use crate::error::AppError;

/// Which frame body to record each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Fullscreen triangle through a graphics pipeline.
    Triangle,
    /// Empty render pass whose load op clears the image.
    #[default]
    ClearPass,
    /// Transfer clear between two image barriers.
    ImageClear,
}

impl Variant {
    pub const ALL: [Self; 3] = [Self::Triangle, Self::ClearPass, Self::ImageClear];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Triangle => "triangle",
            Self::ClearPass => "clear-pass",
            Self::ImageClear => "image-clear",
        }
    }

    /// Whether this build can run the variant.
    pub const fn is_available(self) -> bool {
        match self {
            Self::Triangle => cfg!(feature = "triangle"),
            Self::ClearPass | Self::ImageClear => true,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "triangle" | "tri" => Ok(Self::Triangle),
            "clear-pass" | "clear" | "renderpass" => Ok(Self::ClearPass),
            "image-clear" | "barrier" => Ok(Self::ImageClear),
            _ => Err(AppError::UnknownVariant(s.to_string())),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also used as the Vulkan application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Present mode preference.
    pub present: PresentPreference,
    /// Frame slot fence timeout (None waits indefinitely).
    pub fence_timeout: Option<Duration>,
    /// Swapchain acquire timeout (None waits indefinitely).
    pub acquire_timeout: Option<Duration>,
    /// Exit after presenting this many frames.
    pub frame_limit: Option<u64>,
    /// Frame body to record.
    pub variant: Variant,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "swapframe".to_string(),
            width: 1280,
            height: 720,
            validation: cfg!(debug_assertions),
            present: PresentPreference::default(),
            fence_timeout: None,
            acquire_timeout: None,
            frame_limit: None,
            variant: Variant::default(),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_present(mut self, present: PresentPreference) -> Self {
        self.present = present;
        self
    }

    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = Some(timeout);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Stop after `frames` presented frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    /// Frame loop settings derived from this configuration.
    pub fn frame_config(&self) -> FrameConfig {
        let mut config = FrameConfig::default();
        if let Some(timeout) = self.fence_timeout {
            config = config.with_fence_timeout(timeout);
        }
        if let Some(timeout) = self.acquire_timeout {
            config = config.with_acquire_timeout(timeout);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_sample_window() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.present, PresentPreference::LowLatency);
        assert_eq!(config.frame_config(), FrameConfig::default());
    }

    #[test]
    fn builder_sets_fields() {
        let config = AppConfig::new("demo")
            .with_size(640, 480)
            .with_validation(false)
            .with_present(PresentPreference::Fifo)
            .with_fence_timeout(Duration::from_millis(5))
            .with_frame_limit(10)
            .with_variant(Variant::ImageClear);

        assert_eq!(config.title, "demo");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(!config.validation);
        assert_eq!(config.frame_limit, Some(10));
        assert_eq!(config.variant, Variant::ImageClear);
        assert_eq!(config.frame_config().fence_timeout_ns, 5_000_000);
        assert_eq!(config.frame_config().acquire_timeout_ns, u64::MAX);
    }

    #[test]
    fn variants_parse_from_names() {
        for variant in Variant::ALL {
            assert_eq!(variant.name().parse::<Variant>().unwrap(), variant);
        }
        assert_eq!("Barrier".parse::<Variant>().unwrap(), Variant::ImageClear);
        assert!(matches!(
            "wireframe".parse::<Variant>(),
            Err(AppError::UnknownVariant(_))
        ));
    }

    #[test]
    fn clear_variants_always_available() {
        assert!(Variant::ClearPass.is_available());
        assert!(Variant::ImageClear.is_available());
    }
}
