//! Application context: the provisioning chain and its teardown.

use std::sync::Arc;

use raw_window_handle::HasDisplayHandle;
use swapframe_gpu::{
    negotiate, FrameEngine, FrameStats, FrameStatus, GpuContext, GpuError, GpuInstance,
    GpuInstanceBuilder, Lifecycle, ShutdownSignal, Stage, SurfaceContext, Swapchain,
    VulkanBackend,
};
use swapframe_render::{ClearPass, FrameStrategy, ImageClear};
use tracing::{error, info};
use winit::window::Window;

use crate::config::{AppConfig, Variant};
use crate::error::AppError;

/// Everything between the window and the frame loop.
///
/// Stages are built in order (instance, surface, device, swapchain, frame
/// body, frame engine) and torn down in exact reverse once the device is
/// idle. A stage that failed to build leaves the later fields empty; the
/// teardown skips them.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    lifecycle: Lifecycle,
    instance: Option<GpuInstance>,
    surface: Option<SurfaceContext>,
    gpu: Option<GpuContext>,
    swapchain: Option<Swapchain>,
    strategy: Option<Box<dyn FrameStrategy>>,
    engine: Option<FrameEngine>,
}

impl AppContext {
    /// Provision the whole chain for `window`.
    ///
    /// On failure everything built so far is torn down before returning.
    /// The context keeps its own handle on `window`, so the surface never
    /// outlives it.
    pub fn new(window: Arc<Window>, config: &AppConfig) -> Result<Self, AppError> {
        let mut ctx = Self {
            window,
            lifecycle: Lifecycle::new(),
            instance: None,
            surface: None,
            gpu: None,
            swapchain: None,
            strategy: None,
            engine: None,
        };

        if let Err(e) = ctx.provision(config) {
            if let Err(teardown) = ctx.teardown() {
                error!("Teardown after failed provisioning: {teardown}");
            }
            return Err(e);
        }
        Ok(ctx)
    }

    fn provision(&mut self, config: &AppConfig) -> Result<(), AppError> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| AppError::Platform(format!("display handle: {e}")))?
            .as_raw();

        let instance = GpuInstanceBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .build(display)?;
        let instance = self.instance.insert(instance);
        self.lifecycle.enter(Stage::Instance)?;

        // SAFETY: the instance and the window both outlive the surface; the
        // teardown destroys it first and `self.window` is dropped last
        let surface = unsafe { SurfaceContext::from_window(instance, self.window.as_ref())? };
        let surface = self.surface.insert(surface);
        self.lifecycle.enter(Stage::Surface)?;

        // SAFETY: instance and surface are live and torn down after the device
        let gpu = unsafe { GpuContext::new(instance, surface)? };
        let gpu = self.gpu.insert(gpu);
        self.lifecycle.enter(Stage::Device)?;

        let size = self.window.inner_size();
        let caps = surface.capabilities(gpu.physical_device())?;
        let plan = negotiate(
            &caps,
            size.width.max(1),
            size.height.max(1),
            config.present,
        )?;
        // SAFETY: device and surface come from the same instance
        let swapchain = unsafe { Swapchain::new(gpu, surface, &plan)? };
        let swapchain = self.swapchain.insert(swapchain);
        self.lifecycle.enter(Stage::Swapchain)?;

        // SAFETY: the frame body is destroyed before the swapchain and device
        let strategy = unsafe { create_strategy(config.variant, gpu.device(), swapchain)? };
        let uses_targets = strategy.uses_render_targets();
        info!("Frame body: {}", strategy.name());
        self.strategy = Some(strategy);
        if uses_targets {
            self.lifecycle.enter(Stage::RenderTargets)?;
        }

        // SAFETY: the swapchain was created from this device and both outlive the engine
        let mut backend = unsafe { VulkanBackend::new(gpu, swapchain) };
        self.engine = Some(FrameEngine::new(&mut backend, config.frame_config())?);
        self.lifecycle.enter(Stage::FrameEngine)?;

        Ok(())
    }

    /// Run one frame.
    pub fn draw_frame(&mut self) -> Result<FrameStatus, GpuError> {
        let (Some(gpu), Some(swapchain), Some(strategy), Some(engine)) = (
            &self.gpu,
            &self.swapchain,
            &mut self.strategy,
            &mut self.engine,
        ) else {
            return Err(GpuError::InvalidState("frame loop is not provisioned".into()));
        };

        // SAFETY: the swapchain was created from this device and both outlive the call
        let mut backend = unsafe { VulkanBackend::new(gpu, swapchain) };

        let started = engine.frame_counter();
        let status = engine.draw_frame(&mut backend, strategy.as_mut());
        if engine.frame_counter() != started {
            self.lifecycle.note_submission();
        }
        status
    }

    /// Frame loop counters, if the engine is live.
    pub fn stats(&self) -> Option<FrameStats> {
        self.engine.as_ref().map(FrameEngine::stats)
    }

    /// Handle that stops the frame loop before its next frame.
    pub fn shutdown_signal(&self) -> Option<ShutdownSignal> {
        self.engine.as_ref().map(FrameEngine::shutdown_signal)
    }

    pub fn gpu(&self) -> Option<&GpuContext> {
        self.gpu.as_ref()
    }

    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    /// Stages currently live, oldest first.
    pub fn live_stages(&self) -> &[Stage] {
        self.lifecycle.live_stages()
    }

    /// Idle the device and destroy every live stage in reverse order.
    ///
    /// Stops at the first failure, leaving the remaining stages alive rather
    /// than destroying objects the GPU may still use. A failed teardown is
    /// final: later calls, including the one from `Drop`, refuse to retry.
    pub fn teardown(&mut self) -> Result<(), GpuError> {
        let result = self.teardown_stages();
        if let Err(e) = &result {
            self.lifecycle.abandon(e.to_string());
        }
        result
    }

    /// Whether an earlier teardown failed and the remaining stages leak.
    pub fn is_teardown_abandoned(&self) -> bool {
        self.lifecycle.is_abandoned()
    }

    fn teardown_stages(&mut self) -> Result<(), GpuError> {
        if let Some(reason) = self.lifecycle.abandoned_reason() {
            return Err(GpuError::TeardownOrder(format!(
                "teardown already failed: {reason}"
            )));
        }

        if let Some(gpu) = &self.gpu {
            gpu.wait_idle()?;
            self.lifecycle.mark_device_idle();
        }

        if self.engine.is_some() {
            self.lifecycle.exit(Stage::FrameEngine)?;
            let (Some(gpu), Some(swapchain), Some(engine)) =
                (&self.gpu, &self.swapchain, self.engine.take())
            else {
                return Err(GpuError::TeardownOrder(
                    "frame engine outlived its device or swapchain".into(),
                ));
            };
            // SAFETY: the engine was created through this device and swapchain
            let mut backend = unsafe { VulkanBackend::new(gpu, swapchain) };
            engine.destroy(&mut backend)?;
        }

        if let Some(strategy) = &self.strategy {
            if strategy.uses_render_targets() {
                self.lifecycle.exit(Stage::RenderTargets)?;
            }
            let (Some(gpu), Some(mut strategy)) = (&self.gpu, self.strategy.take()) else {
                return Err(GpuError::TeardownOrder("frame body outlived its device".into()));
            };
            // SAFETY: device idle, swapchain still alive
            unsafe { strategy.destroy(gpu.device()) };
        }

        if self.swapchain.is_some() {
            self.lifecycle.exit(Stage::Swapchain)?;
            if let (Some(gpu), Some(swapchain)) = (&self.gpu, self.swapchain.take()) {
                // SAFETY: device idle, nothing references the images
                unsafe { swapchain.destroy(gpu.swapchain_loader()) };
            }
        }

        if self.gpu.is_some() {
            self.lifecycle.exit(Stage::Device)?;
            if let Some(gpu) = self.gpu.take() {
                // SAFETY: device idle, every child object destroyed
                unsafe { gpu.destroy() };
            }
        }

        if self.surface.is_some() {
            self.lifecycle.exit(Stage::Surface)?;
            if let Some(surface) = self.surface.take() {
                // SAFETY: the swapchain is gone
                unsafe { surface.destroy() };
            }
        }

        if self.instance.is_some() {
            self.lifecycle.exit(Stage::Instance)?;
            if let Some(instance) = self.instance.take() {
                // SAFETY: surface and device are gone
                unsafe { instance.destroy() };
            }
        }

        Ok(())
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if self.lifecycle.top().is_some() && !self.lifecycle.is_abandoned() {
            if let Err(e) = self.teardown() {
                error!("Teardown failed, leaking remaining Vulkan objects: {e}");
            }
        }
    }
}

/// # Safety
/// `swapchain` must belong to `device`, and the returned body must be
/// destroyed before either.
unsafe fn create_strategy(
    variant: Variant,
    device: &ash::Device,
    swapchain: &Swapchain,
) -> Result<Box<dyn FrameStrategy>, AppError> {
    match variant {
        #[cfg(feature = "triangle")]
        // SAFETY: forwarded from the caller
        Variant::Triangle => Ok(Box::new(unsafe {
            swapframe_render::TrianglePass::new(device, swapchain)?
        })),
        #[cfg(not(feature = "triangle"))]
        Variant::Triangle => Err(AppError::VariantUnavailable("triangle")),
        // SAFETY: forwarded from the caller
        Variant::ClearPass => Ok(Box::new(unsafe { ClearPass::new(device, swapchain)? })),
        Variant::ImageClear => Ok(Box::new(ImageClear::new(swapchain)?)),
    }
}
