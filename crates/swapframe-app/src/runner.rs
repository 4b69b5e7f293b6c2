//! Application runner and event loop.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use swapframe_gpu::FrameStatus;

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::error::AppError;

/// Run the sample with the given configuration.
///
/// Initializes logging, creates the window and the provisioning chain, and
/// draws one frame per redraw until the window closes, the frame limit is
/// reached, or a frame fails. Teardown always runs before returning.
pub fn run_app(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if !config.variant.is_available() {
        return Err(AppError::VariantUnavailable(config.variant.name()).into());
    }

    info!("{} starting ({} variant)...", config.title, config.variant);

    let event_loop = EventLoop::new().map_err(|e| AppError::Platform(e.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        state: None,
        failure: None,
    };

    event_loop
        .run_app(&mut runner)
        .map_err(|e| AppError::Platform(format!("event loop: {e}")))?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct AppRunner {
    config: AppConfig,
    state: Option<AppState>,
    /// First fatal error; returned from [`run_app`] after teardown.
    failure: Option<anyhow::Error>,
}

struct AppState {
    ctx: AppContext,
    started: Instant,
    frames: u64,
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(signal) = self.state.as_ref().and_then(|s| s.ctx.shutdown_signal()) {
                    signal.request();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            if let Err(e) = state.shutdown() {
                error!("Teardown failed: {e}");
                self.failure.get_or_insert(e.into());
            }
        }
    }
}

impl AppRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        // Fixed size: the swapchain is never recreated
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let ctx = AppContext::new(window, &self.config)?;

        Ok(AppState {
            ctx,
            started: Instant::now(),
            frames: 0,
        })
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = &mut self.state else {
            return;
        };

        match state.ctx.draw_frame() {
            Ok(FrameStatus::Presented(_)) => {
                state.frames += 1;
                if self.config.frame_limit.is_some_and(|limit| state.frames >= limit) {
                    info!("Frame limit of {} reached", state.frames);
                    event_loop.exit();
                }
            }
            Ok(FrameStatus::Cancelled) => event_loop.exit(),
            Err(e) if e.is_recoverable() => warn!("Frame skipped: {e}"),
            Err(e) => {
                error!("Render error: {e}");
                self.failure = Some(e.into());
                event_loop.exit();
            }
        }
    }
}

impl AppState {
    fn shutdown(&mut self) -> Result<(), AppError> {
        if let Some(stats) = self.ctx.stats() {
            let elapsed = self.started.elapsed();
            info!("Frame statistics:");
            info!("  Frames presented: {}", stats.frames_presented);
            info!("  Fence stalls: {}", stats.fence_stalls);
            info!("  Suboptimal frames: {}", stats.suboptimal_frames);
            if self.frames > 0 {
                let avg_ms = elapsed.as_secs_f64() * 1000.0 / self.frames as f64;
                info!("  Avg frame time: {avg_ms:.2} ms");
            }
        }

        info!("Starting cleanup...");
        self.ctx.teardown()?;
        info!("Cleanup complete");
        Ok(())
    }
}
