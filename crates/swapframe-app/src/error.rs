//! Application error types.

use swapframe_gpu::GpuError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Window system or event loop failure.
    #[error("Platform error: {0}")]
    Platform(String),

    /// Variant name not recognized.
    #[error("Unknown variant {0:?} (expected triangle, clear-pass or image-clear)")]
    UnknownVariant(String),

    /// Variant compiled out of this build.
    #[error("Variant {0} is not available; rebuild with the `{0}` feature")]
    VariantUnavailable(&'static str),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}
