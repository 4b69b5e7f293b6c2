//! Frame bodies for driving the engine against [`MockGpu`].

use ash::vk;
use swapframe_gpu::{FrameBody, FrameContext, GpuError, Result};

use crate::mock::MockGpu;

/// What a [`RecordingBody`] saw for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedFrame {
    pub frame_number: u64,
    pub slot: usize,
    pub image_index: u32,
    pub image: vk::Image,
    pub command_buffer: vk::CommandBuffer,
}

/// Records every frame context it is handed.
///
/// Fails the frame if the command buffer is not open when the body runs.
#[derive(Debug, Default)]
pub struct RecordingBody {
    pub frames: Vec<RecordedFrame>,
    wait_stage: Option<vk::PipelineStageFlags>,
}

impl RecordingBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the acquired image at `stage` instead of color output.
    pub fn with_wait_stage(mut self, stage: vk::PipelineStageFlags) -> Self {
        self.wait_stage = Some(stage);
        self
    }

    pub fn last(&self) -> Option<&RecordedFrame> {
        self.frames.last()
    }
}

impl FrameBody<MockGpu> for RecordingBody {
    fn wait_stage(&self) -> vk::PipelineStageFlags {
        self.wait_stage
            .unwrap_or(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
    }

    fn record(&mut self, backend: &MockGpu, frame: &FrameContext) -> Result<()> {
        if !backend.is_recording(frame.command_buffer) {
            return Err(GpuError::RecordFailure(format!(
                "frame {} handed a command buffer that is not recording",
                frame.frame_number
            )));
        }

        self.frames.push(RecordedFrame {
            frame_number: frame.frame_number,
            slot: frame.slot,
            image_index: frame.image_index,
            image: frame.image,
            command_buffer: frame.command_buffer,
        });
        Ok(())
    }
}

/// Fails recording on a chosen frame number, records nothing otherwise.
#[derive(Debug, Clone, Copy)]
pub struct FailingBody {
    pub fail_on: u64,
}

impl FailingBody {
    pub fn on_frame(fail_on: u64) -> Self {
        Self { fail_on }
    }
}

impl FrameBody<MockGpu> for FailingBody {
    fn record(&mut self, _backend: &MockGpu, frame: &FrameContext) -> Result<()> {
        if frame.frame_number == self.fail_on {
            return Err(GpuError::RecordFailure(format!(
                "scripted failure on frame {}",
                frame.frame_number
            )));
        }
        Ok(())
    }
}
