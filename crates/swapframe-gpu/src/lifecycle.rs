//! Construction and teardown ordering of the provisioning chain.
//!
//! Stages come up in [`Stage`] order and go down in exact reverse. Stages
//! that own device objects may only be torn down while the device is known
//! to be idle, i.e. after a `vkDeviceWaitIdle` with no submission since.
//! Once a teardown step fails the chain is abandoned: the remaining stages
//! are leaked and no further exit is accepted.

use std::fmt;

use smallvec::SmallVec;

use crate::error::{GpuError, Result};

/// One link of the provisioning chain, in construction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Instance,
    Surface,
    Device,
    Swapchain,
    /// Render pass, image views and framebuffers; skipped by frame bodies
    /// that write swapchain images directly.
    RenderTargets,
    FrameEngine,
}

impl Stage {
    /// All stages in construction order.
    pub const ALL: [Self; 6] = [
        Self::Instance,
        Self::Surface,
        Self::Device,
        Self::Swapchain,
        Self::RenderTargets,
        Self::FrameEngine,
    ];

    /// The stage that must be live before this one is constructed.
    pub const fn prerequisite(self) -> Option<Self> {
        match self {
            Self::Instance => None,
            Self::Surface => Some(Self::Instance),
            Self::Device => Some(Self::Surface),
            Self::Swapchain => Some(Self::Device),
            Self::RenderTargets | Self::FrameEngine => Some(Self::Swapchain),
        }
    }

    /// Whether destroying this stage touches objects the GPU may still use.
    pub const fn requires_idle_device(self) -> bool {
        matches!(
            self,
            Self::Device | Self::Swapchain | Self::RenderTargets | Self::FrameEngine
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instance => "instance",
            Self::Surface => "surface",
            Self::Device => "device",
            Self::Swapchain => "swapchain",
            Self::RenderTargets => "render targets",
            Self::FrameEngine => "frame engine",
        };
        f.write_str(name)
    }
}

/// Tracks which stages are live and whether the device is idle.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    live: SmallVec<[Stage; 6]>,
    device_idle: bool,
    abandoned: Option<String>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            live: SmallVec::new(),
            device_idle: true,
            abandoned: None,
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `stage` has been constructed.
    pub fn enter(&mut self, stage: Stage) -> Result<()> {
        if let Some(&top) = self.live.last() {
            if stage <= top {
                return Err(GpuError::TeardownOrder(format!(
                    "cannot create {stage} after {top}"
                )));
            }
        }

        if let Some(required) = stage.prerequisite() {
            if !self.is_live(required) {
                return Err(GpuError::TeardownOrder(format!(
                    "cannot create {stage} before {required}"
                )));
            }
        }

        self.live.push(stage);
        tracing::debug!("Lifecycle: {stage} up");
        Ok(())
    }

    /// Record that `stage` is about to be destroyed.
    ///
    /// Only the most recently constructed stage may go down, and
    /// device-dependent stages only while the device is idle.
    pub fn exit(&mut self, stage: Stage) -> Result<()> {
        if let Some(reason) = &self.abandoned {
            return Err(GpuError::TeardownOrder(format!(
                "cannot destroy {stage}: teardown abandoned after {reason}"
            )));
        }

        match self.live.last() {
            Some(&top) if top == stage => {}
            Some(&top) => {
                return Err(GpuError::TeardownOrder(format!(
                    "cannot destroy {stage} while {top} is live"
                )));
            }
            None => {
                return Err(GpuError::TeardownOrder(format!(
                    "cannot destroy {stage}: nothing is live"
                )));
            }
        }

        if stage.requires_idle_device() && !self.device_idle {
            return Err(GpuError::TeardownOrder(format!(
                "cannot destroy {stage} before the device is idle"
            )));
        }

        self.live.pop();
        tracing::debug!("Lifecycle: {stage} down");
        Ok(())
    }

    /// A teardown step failed; leak whatever is still live.
    ///
    /// The first reason is kept.
    pub fn abandon(&mut self, reason: impl Into<String>) {
        if self.abandoned.is_none() {
            let reason = reason.into();
            tracing::warn!("Lifecycle: teardown abandoned with {:?} live: {reason}", self.live);
            self.abandoned = Some(reason);
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_some()
    }

    pub fn abandoned_reason(&self) -> Option<&str> {
        self.abandoned.as_deref()
    }

    /// Work was submitted to the device; it is no longer known to be idle.
    pub fn note_submission(&mut self) {
        self.device_idle = false;
    }

    /// The device was waited idle.
    pub fn mark_device_idle(&mut self) {
        self.device_idle = true;
    }

    pub fn is_device_idle(&self) -> bool {
        self.device_idle
    }

    pub fn is_live(&self, stage: Stage) -> bool {
        self.live.contains(&stage)
    }

    /// Live stages, oldest first.
    pub fn live_stages(&self) -> &[Stage] {
        &self.live
    }

    /// The most recently constructed live stage.
    pub fn top(&self) -> Option<Stage> {
        self.live.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_up() -> Lifecycle {
        let mut lifecycle = Lifecycle::new();
        for stage in Stage::ALL {
            lifecycle.enter(stage).unwrap();
        }
        lifecycle
    }

    #[test]
    fn full_chain_up_and_down() {
        let mut lifecycle = all_up();
        assert_eq!(lifecycle.live_stages(), &Stage::ALL);

        lifecycle.note_submission();
        lifecycle.mark_device_idle();
        for stage in Stage::ALL.into_iter().rev() {
            lifecycle.exit(stage).unwrap();
        }
        assert!(lifecycle.live_stages().is_empty());
    }

    #[test]
    fn render_targets_are_optional() {
        let mut lifecycle = Lifecycle::new();
        for stage in [
            Stage::Instance,
            Stage::Surface,
            Stage::Device,
            Stage::Swapchain,
            Stage::FrameEngine,
        ] {
            lifecycle.enter(stage).unwrap();
        }
        assert!(!lifecycle.is_live(Stage::RenderTargets));
    }

    #[test]
    fn out_of_order_construction_rejected() {
        let mut lifecycle = Lifecycle::new();
        assert!(matches!(
            lifecycle.enter(Stage::Device),
            Err(GpuError::TeardownOrder(_))
        ));

        lifecycle.enter(Stage::Instance).unwrap();
        lifecycle.enter(Stage::Surface).unwrap();
        assert!(lifecycle.enter(Stage::Instance).is_err());
        assert!(lifecycle.enter(Stage::Surface).is_err());
        assert!(lifecycle.enter(Stage::Swapchain).is_err());
    }

    #[test]
    fn only_top_stage_may_be_destroyed() {
        let mut lifecycle = all_up();
        let err = lifecycle.exit(Stage::Device).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Teardown order violated: cannot destroy device while frame engine is live"
        );
        assert_eq!(lifecycle.top(), Some(Stage::FrameEngine));
    }

    #[test]
    fn busy_device_blocks_teardown() {
        let mut lifecycle = all_up();
        lifecycle.note_submission();
        assert!(lifecycle.exit(Stage::FrameEngine).is_err());

        lifecycle.mark_device_idle();
        lifecycle.exit(Stage::FrameEngine).unwrap();
    }

    #[test]
    fn surface_and_instance_do_not_need_idle_device() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.enter(Stage::Instance).unwrap();
        lifecycle.enter(Stage::Surface).unwrap();
        lifecycle.note_submission();
        lifecycle.exit(Stage::Surface).unwrap();
        lifecycle.exit(Stage::Instance).unwrap();
    }

    #[test]
    fn abandoned_chain_refuses_every_exit() {
        let mut lifecycle = all_up();
        lifecycle.exit(Stage::FrameEngine).unwrap();
        lifecycle.abandon("render targets failed");
        lifecycle.abandon("second failure");

        assert_eq!(lifecycle.abandoned_reason(), Some("render targets failed"));
        let err = lifecycle.exit(Stage::RenderTargets).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Teardown order violated: cannot destroy render targets: \
             teardown abandoned after render targets failed"
        );
        assert_eq!(lifecycle.top(), Some(Stage::RenderTargets));
    }

    #[test]
    fn exit_on_empty_chain() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.exit(Stage::Instance).is_err());
    }
}
