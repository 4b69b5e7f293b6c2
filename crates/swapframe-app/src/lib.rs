//! Application shell for swapframe.
//!
//! This crate handles the boilerplate around the frame loop:
//! - Window creation and the winit event loop
//! - Ordered provisioning of instance, surface, device, swapchain,
//!   frame body and frame engine
//! - Reverse-order teardown after the device is idle
//! - Logging setup and frame statistics
//!
//! # Example
//!
//! ```no_run
//! use swapframe_app::{run_app, AppConfig, Variant};
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app(AppConfig::new("clear").with_variant(Variant::ClearPass))
//! }
//! ```

mod config;
mod context;
mod error;
mod runner;

pub use config::{AppConfig, Variant};
pub use context::AppContext;
pub use error::AppError;
pub use runner::run_app;

pub use swapframe_gpu::{FrameStats, PresentPreference};
