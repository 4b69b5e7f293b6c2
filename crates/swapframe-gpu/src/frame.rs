//! Double-buffered frame synchronization.
//!
//! [`FrameEngine`] owns [`FRAME_COUNT`] frame slots, each with a command
//! buffer, an in-flight fence (created signaled), an "image available"
//! semaphore and a "render finished" semaphore. Every call to
//! [`FrameEngine::draw_frame`] runs one cycle on the next slot:
//!
//! 1. wait for the slot's fence, then reset it (the only blocking point)
//! 2. acquire a swapchain image, signaling "image available", and advance
//!    the frame counter
//! 3. record the frame body into the slot's command buffer
//! 4. submit: wait "image available", signal "render finished" and the fence
//! 5. present, waiting on "render finished"
//!
//! The fence wait bounds the CPU to at most [`FRAME_COUNT`] submissions ahead
//! of the GPU. Slot indices and swapchain image indices are separate index
//! spaces: the pool holds 2 or 3 images while there are always 2 slots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use smallvec::SmallVec;
use swapframe_core::constants::FRAME_COUNT;

use crate::backend::FrameBackend;
use crate::error::{GpuError, Result};
use crate::sync::FrameSync;

/// Timeouts used by the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum time to block on a slot's fence, in nanoseconds.
    pub fence_timeout_ns: u64,
    /// Maximum time to wait for a swapchain image, in nanoseconds.
    pub acquire_timeout_ns: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            fence_timeout_ns: u64::MAX,
            acquire_timeout_ns: u64::MAX,
        }
    }
}

impl FrameConfig {
    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout_ns = duration_to_ns(timeout);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ns = duration_to_ns(timeout);
        self
    }
}

fn duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Where a frame slot is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence signaled; the slot may be recorded.
    Idle,
    /// Fence reset; the CPU is acquiring an image or building the command
    /// buffer.
    Recording,
    /// Submitted; the fence signals when the GPU is done.
    Submitted,
}

/// What a frame body gets to record one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Open command buffer; the body must not end it.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// The acquired swapchain image.
    pub image: vk::Image,
    /// Swapchain extent.
    pub extent: vk::Extent2D,
    /// Frame slot recording this frame.
    pub slot: usize,
    /// Monotonic frame number, starting at 0.
    pub frame_number: u64,
}

/// Rendering commands recorded into each frame.
pub trait FrameBody<B: FrameBackend + ?Sized> {
    /// Stage at which the submission waits for the acquired image.
    fn wait_stage(&self) -> vk::PipelineStageFlags {
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
    }

    /// Record commands into `frame.command_buffer`.
    fn record(&mut self, backend: &B, frame: &FrameContext) -> Result<()>;
}

/// Cloneable flag asking the frame loop to stop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop before its next frame.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A frame that was submitted and queued for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentedFrame {
    pub frame_number: u64,
    pub slot: usize,
    pub image_index: u32,
    /// Acquire or present reported the swapchain as suboptimal.
    pub suboptimal: bool,
}

/// Outcome of one [`FrameEngine::draw_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented(PresentedFrame),
    /// Shutdown was requested; nothing was waited on or submitted.
    Cancelled,
}

/// Counters kept by the frame loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_presented: u64,
    /// Times a slot's fence was still unsignaled when the CPU came back to it.
    pub fence_stalls: u64,
    pub suboptimal_frames: u64,
}

#[derive(Debug, Clone, Copy)]
struct FrameSlot {
    sync: FrameSync,
    command_buffer: vk::CommandBuffer,
    state: SlotState,
}

/// The frame synchronization engine.
pub struct FrameEngine {
    command_pool: vk::CommandPool,
    slots: [FrameSlot; FRAME_COUNT],
    frame_counter: u64,
    config: FrameConfig,
    stats: FrameStats,
    halted: Option<String>,
    shutdown: ShutdownSignal,
}

impl FrameEngine {
    /// Create the command pool and the per-slot command buffers and
    /// synchronization primitives.
    pub fn new<B: FrameBackend + ?Sized>(backend: &mut B, config: FrameConfig) -> Result<Self> {
        let command_pool = backend.create_command_pool()?;

        match Self::create_slots(backend, command_pool) {
            Ok(slots) => {
                tracing::debug!("Created {FRAME_COUNT} frame slots");
                Ok(Self {
                    command_pool,
                    slots,
                    frame_counter: 0,
                    config,
                    stats: FrameStats::default(),
                    halted: None,
                    shutdown: ShutdownSignal::new(),
                })
            }
            Err(e) => {
                // SAFETY: nothing from this pool was submitted
                unsafe { backend.destroy_command_pool(command_pool) };
                Err(e)
            }
        }
    }

    fn create_slots<B: FrameBackend + ?Sized>(
        backend: &mut B,
        command_pool: vk::CommandPool,
    ) -> Result<[FrameSlot; FRAME_COUNT]> {
        let command_buffers = backend.allocate_command_buffers(command_pool, FRAME_COUNT as u32)?;
        if command_buffers.len() != FRAME_COUNT {
            return Err(GpuError::InvalidState(format!(
                "expected {FRAME_COUNT} command buffers, got {}",
                command_buffers.len()
            )));
        }

        let mut slots = SmallVec::<[FrameSlot; FRAME_COUNT]>::new();
        for command_buffer in command_buffers {
            match FrameSync::new(backend) {
                Ok(sync) => slots.push(FrameSlot {
                    sync,
                    command_buffer,
                    state: SlotState::Idle,
                }),
                Err(e) => {
                    for slot in &slots {
                        // SAFETY: never submitted
                        unsafe { slot.sync.destroy(backend) };
                    }
                    return Err(e);
                }
            }
        }

        slots
            .into_inner()
            .map_err(|_| GpuError::InvalidState("frame slot count mismatch".into()))
    }

    /// Run one acquire → record → submit → present cycle.
    ///
    /// Two errors leave the engine usable. After [`GpuError::FenceTimeout`]
    /// the slot stays submitted and the next call waits on it again. After
    /// [`GpuError::AcquireTimeout`] the slot's fence is already reset but
    /// nothing was submitted, so the next call skips the wait and retries the
    /// acquire. Every other error halts the engine and later calls return
    /// [`GpuError::Halted`]. The frame counter only advances once an image
    /// was acquired.
    pub fn draw_frame<B, F>(&mut self, backend: &mut B, body: &mut F) -> Result<FrameStatus>
    where
        B: FrameBackend + ?Sized,
        F: FrameBody<B> + ?Sized,
    {
        if let Some(reason) = &self.halted {
            return Err(GpuError::Halted(reason.clone()));
        }
        if self.shutdown.is_requested() {
            return Ok(FrameStatus::Cancelled);
        }

        let slot_index = (self.frame_counter % FRAME_COUNT as u64) as usize;
        let frame_number = self.frame_counter;
        let slot = self.slots[slot_index];

        let _frame_span =
            tracing::trace_span!("frame", slot = slot_index, frame_number).entered();

        {
            let _span = tracing::trace_span!("frame.wait_fence").entered();
            if slot.state == SlotState::Recording {
                // Fence reset by an attempt whose acquire timed out; nothing
                // was submitted, so nothing will signal it.
                tracing::trace!("Slot {slot_index} already reset, retrying acquire");
            } else {
                self.wait_slot(backend, slot_index)?;

                if let Err(e) = backend.reset_fence(slot.sync.in_flight) {
                    return Err(self.halt(GpuError::Vulkan(e)));
                }
                self.slots[slot_index].state = SlotState::Recording;
            }
        }

        let acquired = {
            let _span = tracing::trace_span!("frame.acquire").entered();
            let timeout_ns = self.config.acquire_timeout_ns;
            let acquired = match backend.acquire_next_image(slot.sync.image_available, timeout_ns) {
                Ok(acquired) => acquired,
                Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                    tracing::warn!("No swapchain image available within {timeout_ns} ns");
                    return Err(GpuError::AcquireTimeout { timeout_ns });
                }
                Err(e) => return Err(self.halt(GpuError::AcquireFailure(e))),
            };

            if acquired.index >= backend.image_count() {
                return Err(self.halt(GpuError::InvalidState(format!(
                    "acquired image {} but the swapchain has {} images",
                    acquired.index,
                    backend.image_count()
                ))));
            }
            self.frame_counter += 1;
            acquired
        };

        {
            let _span = tracing::trace_span!("frame.record").entered();
            let Some(image) = backend.swapchain_image(acquired.index) else {
                return Err(self.halt(GpuError::InvalidState(format!(
                    "no swapchain image at index {}",
                    acquired.index
                ))));
            };

            let frame = FrameContext {
                command_buffer: slot.command_buffer,
                image_index: acquired.index,
                image,
                extent: backend.extent(),
                slot: slot_index,
                frame_number,
            };

            if let Err(e) = backend.begin_commands(slot.command_buffer) {
                return Err(self.halt(GpuError::RecordFailure(format!("begin: {e}"))));
            }
            if let Err(e) = body.record(backend, &frame) {
                return Err(self.halt(e));
            }
            if let Err(e) = backend.end_commands(slot.command_buffer) {
                return Err(self.halt(GpuError::RecordFailure(format!("end: {e}"))));
            }
        }

        {
            let _span = tracing::trace_span!("frame.submit").entered();
            if let Err(e) = backend.submit(
                slot.command_buffer,
                slot.sync.image_available,
                body.wait_stage(),
                slot.sync.render_finished,
                slot.sync.in_flight,
            ) {
                return Err(self.halt(GpuError::SubmitFailure(e)));
            }
            self.slots[slot_index].state = SlotState::Submitted;
        }

        let present_suboptimal = {
            let _span = tracing::trace_span!("frame.present").entered();
            match backend.present(acquired.index, slot.sync.render_finished) {
                Ok(suboptimal) => suboptimal,
                Err(e) => return Err(self.halt(GpuError::PresentFailure(e))),
            }
        };

        let suboptimal = acquired.suboptimal || present_suboptimal;
        if suboptimal {
            if self.stats.suboptimal_frames == 0 {
                tracing::warn!("Swapchain is suboptimal for the surface; continuing without recreation");
            }
            self.stats.suboptimal_frames += 1;
        }
        self.stats.frames_presented += 1;

        Ok(FrameStatus::Presented(PresentedFrame {
            frame_number,
            slot: slot_index,
            image_index: acquired.index,
            suboptimal,
        }))
    }

    /// Block until the slot's previous submission has retired.
    fn wait_slot<B: FrameBackend + ?Sized>(&mut self, backend: &mut B, slot_index: usize) -> Result<()> {
        let fence = self.slots[slot_index].sync.in_flight;

        match backend.fence_signaled(fence) {
            Ok(true) => {}
            Ok(false) => {
                self.stats.fence_stalls += 1;
                tracing::trace!("Slot {slot_index} still in flight, waiting");
            }
            Err(e) => return Err(self.halt(GpuError::Vulkan(e))),
        }

        match backend.wait_for_fence(fence, self.config.fence_timeout_ns) {
            Ok(()) => {
                self.slots[slot_index].state = SlotState::Idle;
                Ok(())
            }
            Err(vk::Result::TIMEOUT) => {
                tracing::warn!(
                    "Fence of slot {slot_index} not signaled within {} ns",
                    self.config.fence_timeout_ns
                );
                Err(GpuError::FenceTimeout {
                    slot: slot_index,
                    timeout_ns: self.config.fence_timeout_ns,
                })
            }
            Err(e) => Err(self.halt(GpuError::Vulkan(e))),
        }
    }

    fn halt(&mut self, error: GpuError) -> GpuError {
        tracing::error!("Frame loop halted: {error}");
        self.halted = Some(error.to_string());
        error
    }

    /// Wait for every submitted slot to retire.
    pub fn drain<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state != SlotState::Submitted {
                continue;
            }

            match backend.wait_for_fence(slot.sync.in_flight, self.config.fence_timeout_ns) {
                Ok(()) => slot.state = SlotState::Idle,
                Err(vk::Result::TIMEOUT) => {
                    return Err(GpuError::FenceTimeout {
                        slot: index,
                        timeout_ns: self.config.fence_timeout_ns,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Idle the device, drain every slot, then release fences, semaphores and
    /// the command pool.
    ///
    /// If the device cannot be idled or a slot cannot be drained, nothing is
    /// destroyed and the error is returned.
    pub fn destroy<B: FrameBackend + ?Sized>(mut self, backend: &mut B) -> Result<()> {
        backend.wait_idle()?;
        self.drain(backend)?;

        // SAFETY: device idle and every slot drained
        unsafe {
            for slot in &self.slots {
                backend.destroy_fence(slot.sync.in_flight);
            }
            for slot in &self.slots {
                backend.destroy_semaphore(slot.sync.render_finished);
                backend.destroy_semaphore(slot.sync.image_available);
            }
            backend.destroy_command_pool(self.command_pool);
        }

        tracing::debug!(
            "Destroyed frame engine after {} frames",
            self.stats.frames_presented
        );
        Ok(())
    }

    /// Number of frames started so far.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    /// Slots whose submission has not been observed to retire.
    pub fn in_flight_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Submitted)
            .count()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// The error that halted the engine, if any.
    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// A handle that stops the loop before its next frame.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_are_unbounded() {
        let config = FrameConfig::default();
        assert_eq!(config.fence_timeout_ns, u64::MAX);
        assert_eq!(config.acquire_timeout_ns, u64::MAX);
    }

    #[test]
    fn timeouts_from_durations() {
        let config = FrameConfig::default()
            .with_fence_timeout(Duration::from_millis(250))
            .with_acquire_timeout(Duration::from_secs(1));
        assert_eq!(config.fence_timeout_ns, 250_000_000);
        assert_eq!(config.acquire_timeout_ns, 1_000_000_000);

        let saturated = FrameConfig::default().with_fence_timeout(Duration::MAX);
        assert_eq!(saturated.fence_timeout_ns, u64::MAX);
    }

    #[test]
    fn shutdown_signal_is_shared() {
        let signal = ShutdownSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_requested());
        handle.request();
        assert!(signal.is_requested());
    }
}
