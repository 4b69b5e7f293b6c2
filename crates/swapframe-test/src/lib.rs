//! Test harness for swapframe.
//!
//! Provides a scripted mock GPU implementing [`FrameBackend`] that checks
//! the synchronization protocol as frames go through it, plus frame bodies
//! for driving the engine in tests.
//!
//! [`FrameBackend`]: swapframe_gpu::FrameBackend

pub mod body;
pub mod mock;

pub use body::{FailingBody, RecordedFrame, RecordingBody};
pub use mock::{Completion, FailurePoint, MockGpu};
