//! A scripted GPU for driving the frame engine without a device.
//!
//! Handles are plain counters wrapped with `vk::Handle::from_raw`. Queue
//! submissions retire in FIFO order, either when the CPU blocks on one of
//! their fences ([`Completion::OnWait`]) or only when the test says so
//! ([`Completion::Manual`]).
//!
//! Every call is checked against the rules the real API imposes on the frame
//! loop: fences are not reset or destroyed while a pending submission will
//! signal them, command buffers are not re-recorded while pending,
//! semaphores are waited on only once something will signal them, and the
//! device is not destroyed while work or objects remain. Breaches are
//! collected in [`MockGpu::violations`] instead of panicking so tests can
//! assert on them.

use std::collections::{HashMap, VecDeque};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use swapframe_gpu::{AcquiredImage, FrameBackend, GpuError};

/// When queued submissions finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Work finishes as soon as the CPU waits on it: an infinitely fast GPU
    /// whose progress is only observed through fences.
    OnWait,
    /// Work finishes only through [`MockGpu::complete_next`] or
    /// [`MockGpu::complete_all`]; fence waits on unfinished work time out.
    Manual,
}

/// A call that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    FenceWait,
    Acquire,
    Submit,
    Present,
    WaitIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SemaphoreState {
    Unsignaled,
    Signaled,
    /// A queued submission will signal it; `consumed` if a present already
    /// waits on that signal.
    PendingSignal { consumed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Debug, Clone, Copy)]
struct Submission {
    cmd: vk::CommandBuffer,
    signal: vk::Semaphore,
    fence: vk::Fence,
}

/// Mock device, queue and swapchain.
pub struct MockGpu {
    next_handle: u64,
    completion: Completion,
    images: Vec<vk::Image>,
    extent: vk::Extent2D,
    next_image: u32,
    forced_image: Option<u32>,
    images_withheld: bool,
    fences: HashMap<u64, bool>,
    semaphores: HashMap<u64, SemaphoreState>,
    pools: HashMap<u64, Vec<u64>>,
    command_buffers: HashMap<u64, CommandState>,
    pending: VecDeque<Submission>,
    failure: Option<(FailurePoint, vk::Result)>,
    suboptimal: bool,
    device_destroyed: bool,
    max_in_flight: usize,
    stalls: u64,
    log: Vec<String>,
    violations: Vec<String>,
}

fn fence_name(fence: vk::Fence) -> String {
    format!("fence#{}", fence.as_raw())
}

fn semaphore_name(semaphore: vk::Semaphore) -> String {
    format!("sem#{}", semaphore.as_raw())
}

fn cmd_name(cmd: vk::CommandBuffer) -> String {
    format!("cmd#{}", cmd.as_raw())
}

impl MockGpu {
    /// A mock swapchain with `image_count` images of 1280x720.
    pub fn new(image_count: u32, completion: Completion) -> Self {
        Self {
            next_handle: 1,
            completion,
            images: (0..u64::from(image_count))
                .map(|i| vk::Image::from_raw(0x100 + i))
                .collect(),
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            next_image: 0,
            forced_image: None,
            images_withheld: false,
            fences: HashMap::new(),
            semaphores: HashMap::new(),
            pools: HashMap::new(),
            command_buffers: HashMap::new(),
            pending: VecDeque::new(),
            failure: None,
            suboptimal: false,
            device_destroyed: false,
            max_in_flight: 0,
            stalls: 0,
            log: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Make the next call at `point` fail with `result`.
    pub fn fail_next(&mut self, point: FailurePoint, result: vk::Result) {
        self.failure = Some((point, result));
    }

    /// While set, no image becomes available: acquires time out, or report
    /// `NOT_READY` when polled with a zero timeout.
    pub fn withhold_images(&mut self, withheld: bool) {
        self.images_withheld = withheld;
    }

    /// Hand out `index` on the next successful acquire, even if it is out of
    /// range.
    pub fn force_next_image(&mut self, index: u32) {
        self.forced_image = Some(index);
    }

    /// Report every acquire from now on as suboptimal.
    pub fn set_suboptimal(&mut self, suboptimal: bool) {
        self.suboptimal = suboptimal;
    }

    /// Retire the oldest queued submission. Returns false if none was queued.
    pub fn complete_next(&mut self) -> bool {
        let Some(submission) = self.pending.pop_front() else {
            return false;
        };

        self.log.push(format!("complete {}", cmd_name(submission.cmd)));
        self.fences.insert(submission.fence.as_raw(), true);
        if let Some(state) = self.semaphores.get_mut(&submission.signal.as_raw()) {
            *state = match *state {
                SemaphoreState::PendingSignal { consumed: true } => SemaphoreState::Unsignaled,
                _ => SemaphoreState::Signaled,
            };
        }
        self.command_buffers
            .insert(submission.cmd.as_raw(), CommandState::Initial);
        true
    }

    /// Retire every queued submission.
    pub fn complete_all(&mut self) {
        while self.complete_next() {}
    }

    /// Destroy the mock device.
    ///
    /// Fails, and records a violation, if submissions are still queued or
    /// any fence, semaphore or command pool is still alive.
    pub fn destroy_device(&mut self) -> swapframe_gpu::Result<()> {
        let mut problems = Vec::new();
        if !self.pending.is_empty() {
            problems.push(format!("{} submissions in flight", self.pending.len()));
        }
        if !self.fences.is_empty() {
            problems.push(format!("{} fences alive", self.fences.len()));
        }
        if !self.semaphores.is_empty() {
            problems.push(format!("{} semaphores alive", self.semaphores.len()));
        }
        if !self.pools.is_empty() {
            problems.push(format!("{} command pools alive", self.pools.len()));
        }

        if problems.is_empty() {
            self.device_destroyed = true;
            self.log.push("destroy device".to_string());
            return Ok(());
        }

        let message = format!("device destroyed with {}", problems.join(", "));
        self.violations.push(message.clone());
        Err(GpuError::TeardownOrder(message))
    }

    /// Number of queued, unfinished submissions.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Largest number of submissions ever queued at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Fence waits that had to retire work before returning.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    /// Whether `cmd` is between begin and end.
    pub fn is_recording(&self, cmd: vk::CommandBuffer) -> bool {
        self.command_buffers.get(&cmd.as_raw()) == Some(&CommandState::Recording)
    }

    /// Frame loop calls in order.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Protocol breaches seen so far.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    fn alloc(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn violation(&mut self, message: String) {
        tracing::debug!("mock GPU violation: {message}");
        self.violations.push(message);
    }

    fn check_device(&mut self, call: &str) {
        if self.device_destroyed {
            self.violation(format!("{call} after the device was destroyed"));
        }
    }

    fn take_failure(&mut self, point: FailurePoint) -> Option<vk::Result> {
        match self.failure {
            Some((p, result)) if p == point => {
                self.failure = None;
                Some(result)
            }
            _ => None,
        }
    }

    fn fence_pending(&self, fence: vk::Fence) -> bool {
        self.pending.iter().any(|s| s.fence == fence)
    }

    fn semaphore_pending(&self, semaphore: vk::Semaphore) -> bool {
        self.pending.iter().any(|s| s.signal == semaphore)
    }
}

impl FrameBackend for MockGpu {
    fn create_command_pool(&mut self) -> VkResult<vk::CommandPool> {
        self.check_device("create_command_pool");
        let handle = self.alloc();
        self.pools.insert(handle, Vec::new());
        Ok(vk::CommandPool::from_raw(handle))
    }

    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        if !self.pools.contains_key(&pool.as_raw()) {
            return Err(vk::Result::ERROR_UNKNOWN);
        }

        let handles: Vec<u64> = (0..count).map(|_| self.alloc()).collect();
        for &handle in &handles {
            self.command_buffers.insert(handle, CommandState::Initial);
        }
        if let Some(buffers) = self.pools.get_mut(&pool.as_raw()) {
            buffers.extend(&handles);
        }
        Ok(handles.into_iter().map(vk::CommandBuffer::from_raw).collect())
    }

    fn create_fence(&mut self, signaled: bool) -> VkResult<vk::Fence> {
        self.check_device("create_fence");
        let handle = self.alloc();
        self.fences.insert(handle, signaled);
        Ok(vk::Fence::from_raw(handle))
    }

    fn create_semaphore(&mut self) -> VkResult<vk::Semaphore> {
        self.check_device("create_semaphore");
        let handle = self.alloc();
        self.semaphores.insert(handle, SemaphoreState::Unsignaled);
        Ok(vk::Semaphore::from_raw(handle))
    }

    fn fence_signaled(&mut self, fence: vk::Fence) -> VkResult<bool> {
        self.fences
            .get(&fence.as_raw())
            .copied()
            .ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        self.check_device("wait_for_fence");
        if let Some(result) = self.take_failure(FailurePoint::FenceWait) {
            return Err(result);
        }

        match self.fences.get(&fence.as_raw()) {
            None => return Err(vk::Result::ERROR_UNKNOWN),
            Some(true) => {
                self.log.push(format!("wait {}", fence_name(fence)));
                return Ok(());
            }
            Some(false) => {}
        }

        if !self.fence_pending(fence) {
            if timeout_ns == u64::MAX {
                self.violation(format!(
                    "unbounded wait on {} which nothing will signal",
                    fence_name(fence)
                ));
            }
            return Err(vk::Result::TIMEOUT);
        }

        match self.completion {
            Completion::OnWait => {
                while self.fences.get(&fence.as_raw()) == Some(&false) && self.complete_next() {}
                self.stalls += 1;
                self.log.push(format!("wait {} (stalled)", fence_name(fence)));
                Ok(())
            }
            Completion::Manual => {
                self.log.push(format!("wait {} (timed out)", fence_name(fence)));
                Err(vk::Result::TIMEOUT)
            }
        }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        self.check_device("reset_fence");
        if self.fence_pending(fence) {
            self.violation(format!("reset of in-flight {}", fence_name(fence)));
        }
        match self.fences.get_mut(&fence.as_raw()) {
            Some(signaled) => *signaled = false,
            None => return Err(vk::Result::ERROR_UNKNOWN),
        }
        self.log.push(format!("reset {}", fence_name(fence)));
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> VkResult<AcquiredImage> {
        self.check_device("acquire_next_image");
        if let Some(result) = self.take_failure(FailurePoint::Acquire) {
            return Err(result);
        }

        match self.semaphores.get(&signal.as_raw()).copied() {
            Some(SemaphoreState::Unsignaled) => {}
            Some(_) => self.violation(format!(
                "acquire signals {} which is already signaled or pending",
                semaphore_name(signal)
            )),
            None => return Err(vk::Result::ERROR_UNKNOWN),
        }

        if self.images_withheld {
            if timeout_ns == u64::MAX {
                self.violation(format!(
                    "unbounded acquire on {} with no image available",
                    semaphore_name(signal)
                ));
            }
            self.log
                .push(format!("acquire -> {} (timed out)", semaphore_name(signal)));
            return Err(if timeout_ns == 0 {
                vk::Result::NOT_READY
            } else {
                vk::Result::TIMEOUT
            });
        }

        self.semaphores
            .insert(signal.as_raw(), SemaphoreState::Signaled);

        let index = match self.forced_image.take() {
            Some(index) => index,
            None => {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count().max(1);
                index
            }
        };
        self.log.push(format!(
            "acquire image#{index} -> {}",
            semaphore_name(signal)
        ));

        Ok(AcquiredImage {
            index,
            suboptimal: self.suboptimal,
        })
    }

    fn begin_commands(&mut self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.check_device("begin_commands");
        match self.command_buffers.get(&cmd.as_raw()).copied() {
            Some(CommandState::Pending) => {
                self.violation(format!("{} re-recorded while pending", cmd_name(cmd)));
            }
            Some(_) => {}
            None => return Err(vk::Result::ERROR_UNKNOWN),
        }
        self.command_buffers
            .insert(cmd.as_raw(), CommandState::Recording);
        self.log.push(format!("begin {}", cmd_name(cmd)));
        Ok(())
    }

    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> VkResult<()> {
        if !self.is_recording(cmd) {
            self.violation(format!("{} ended without begin", cmd_name(cmd)));
        }
        self.command_buffers
            .insert(cmd.as_raw(), CommandState::Executable);
        self.log.push(format!("end {}", cmd_name(cmd)));
        Ok(())
    }

    fn submit(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        _wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        self.check_device("submit");
        if let Some(result) = self.take_failure(FailurePoint::Submit) {
            return Err(result);
        }

        if self.command_buffers.get(&cmd.as_raw()) != Some(&CommandState::Executable) {
            self.violation(format!("{} submitted without being recorded", cmd_name(cmd)));
        }
        if self.fences.get(&fence.as_raw()) != Some(&false) || self.fence_pending(fence) {
            self.violation(format!("{} submitted while signaled or in use", fence_name(fence)));
        }

        match self.semaphores.get(&wait.as_raw()).copied() {
            Some(SemaphoreState::Signaled) => {
                self.semaphores
                    .insert(wait.as_raw(), SemaphoreState::Unsignaled);
            }
            _ if self.semaphore_pending(wait) => {}
            _ => self.violation(format!(
                "submit waits on {} which nothing signals",
                semaphore_name(wait)
            )),
        }

        if self.semaphores.get(&signal.as_raw()) != Some(&SemaphoreState::Unsignaled) {
            self.violation(format!(
                "submit signals {} which is already signaled or pending",
                semaphore_name(signal)
            ));
        }
        self.semaphores.insert(
            signal.as_raw(),
            SemaphoreState::PendingSignal { consumed: false },
        );

        self.command_buffers
            .insert(cmd.as_raw(), CommandState::Pending);
        self.pending.push_back(Submission { cmd, signal, fence });
        self.max_in_flight = self.max_in_flight.max(self.pending.len());

        self.log.push(format!(
            "submit {} wait {} signal {} {}",
            cmd_name(cmd),
            semaphore_name(wait),
            semaphore_name(signal),
            fence_name(fence)
        ));
        Ok(())
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VkResult<bool> {
        self.check_device("present");
        if let Some(result) = self.take_failure(FailurePoint::Present) {
            return Err(result);
        }

        if image_index >= self.image_count() {
            self.violation(format!("present of unknown image#{image_index}"));
        }

        match self.semaphores.get(&wait.as_raw()).copied() {
            Some(SemaphoreState::Signaled) => {
                self.semaphores
                    .insert(wait.as_raw(), SemaphoreState::Unsignaled);
            }
            Some(SemaphoreState::PendingSignal { consumed: false }) => {
                self.semaphores.insert(
                    wait.as_raw(),
                    SemaphoreState::PendingSignal { consumed: true },
                );
            }
            _ => self.violation(format!(
                "present waits on {} which nothing signals",
                semaphore_name(wait)
            )),
        }

        self.log.push(format!(
            "present image#{image_index} wait {}",
            semaphore_name(wait)
        ));
        Ok(false)
    }

    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn swapchain_image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn wait_idle(&mut self) -> VkResult<()> {
        self.check_device("wait_idle");
        if let Some(result) = self.take_failure(FailurePoint::WaitIdle) {
            return Err(result);
        }
        self.complete_all();
        self.log.push("wait idle".to_string());
        Ok(())
    }

    unsafe fn destroy_fence(&mut self, fence: vk::Fence) {
        if self.fence_pending(fence) {
            self.violation(format!("destroyed in-flight {}", fence_name(fence)));
        }
        if self.fences.remove(&fence.as_raw()).is_none() {
            self.violation(format!("destroyed unknown {}", fence_name(fence)));
        }
        self.log.push(format!("destroy {}", fence_name(fence)));
    }

    unsafe fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        if self.semaphore_pending(semaphore) {
            self.violation(format!("destroyed in-flight {}", semaphore_name(semaphore)));
        }
        if self.semaphores.remove(&semaphore.as_raw()).is_none() {
            self.violation(format!("destroyed unknown {}", semaphore_name(semaphore)));
        }
        self.log.push(format!("destroy {}", semaphore_name(semaphore)));
    }

    unsafe fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        let Some(buffers) = self.pools.remove(&pool.as_raw()) else {
            self.violation(format!("destroyed unknown pool#{}", pool.as_raw()));
            return;
        };

        for handle in buffers {
            if self.command_buffers.remove(&handle) == Some(CommandState::Pending) {
                self.violation(format!("destroyed pool with pending cmd#{handle}"));
            }
        }
        self.log.push(format!("destroy pool#{}", pool.as_raw()));
    }
}
