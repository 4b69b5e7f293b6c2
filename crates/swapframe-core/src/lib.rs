//! Core constants, bit utilities and error types for swapframe.
//!
//! This crate provides the leaf pieces shared by the rest of the workspace:
//! - Bit-scan and alignment helpers
//! - Compile-time capacity limits for the bounded GPU object sets
//! - Common error types

pub mod bits;
pub mod error;

pub use bits::{
    bit_align_up, bit_ffs32, bit_ffs64, bit_fls32, bit_fls64, bit_is_pow2, try_align_up, BIT_NONE,
};
pub use error::{Error, Result};

/// Fixed capacities of the frame loop and of the provisioning queries.
pub mod constants {
    /// Number of frame slots the CPU may record ahead of the GPU.
    pub const FRAME_COUNT: usize = 2;
    /// Upper bound on presentable images held by a swapchain.
    pub const MAX_SWAPCHAIN_IMAGES: usize = 3;
    /// Upper bound on physical devices inspected during provisioning.
    pub const MAX_DEVICE_COUNT: usize = 8;
    /// Upper bound on queue families inspected per physical device.
    pub const MAX_QUEUE_COUNT: usize = 4;
    /// Upper bound on present modes read from a surface.
    pub const MAX_PRESENT_MODE_COUNT: usize = 6;
    /// Swapchain image count requested under the mailbox present mode.
    pub const PRESENT_MODE_MAILBOX_IMAGE_COUNT: u32 = 3;
    /// Swapchain image count requested under any other present mode.
    pub const PRESENT_MODE_DEFAULT_IMAGE_COUNT: u32 = 2;

    const _: () = assert!(crate::bits::bit_is_pow2(FRAME_COUNT as u32));
    const _: () = assert!(PRESENT_MODE_MAILBOX_IMAGE_COUNT as usize <= MAX_SWAPCHAIN_IMAGES);
}
