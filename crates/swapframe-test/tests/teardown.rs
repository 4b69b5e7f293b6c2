//! Draining and ordered destruction of the frame loop.

use std::time::Duration;

use ash::vk;
use swapframe_gpu::{
    FrameBackend, FrameConfig, FrameEngine, FrameStatus, GpuError, Lifecycle, SlotState, Stage,
};
use swapframe_test::{Completion, FailurePoint, MockGpu, RecordingBody};

fn run_frames(gpu: &mut MockGpu, engine: &mut FrameEngine, frames: usize) {
    let mut body = RecordingBody::new();
    for _ in 0..frames {
        assert!(matches!(
            engine.draw_frame(gpu, &mut body),
            Ok(FrameStatus::Presented(_))
        ));
    }
}

#[test]
fn engine_teardown_idles_then_releases_everything() {
    let mut gpu = MockGpu::new(2, Completion::OnWait);
    let mut engine = FrameEngine::new(&mut gpu, FrameConfig::default()).unwrap();
    run_frames(&mut gpu, &mut engine, 3);
    assert_eq!(gpu.in_flight(), 2);

    gpu.clear_log();
    engine.destroy(&mut gpu).unwrap();
    gpu.destroy_device().unwrap();

    insta::assert_snapshot!(gpu.log().join("\n"), @r"
    complete cmd#3
    complete cmd#2
    wait idle
    wait fence#6
    wait fence#9
    destroy fence#6
    destroy fence#9
    destroy sem#5
    destroy sem#4
    destroy sem#8
    destroy sem#7
    destroy pool#1
    destroy device
    ");
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn destroying_the_device_under_a_live_engine_is_refused() {
    let mut gpu = MockGpu::new(2, Completion::OnWait);
    let mut engine = FrameEngine::new(&mut gpu, FrameConfig::default()).unwrap();
    run_frames(&mut gpu, &mut engine, 3);

    let err = gpu.destroy_device().unwrap_err();
    assert!(matches!(err, GpuError::TeardownOrder(_)));
    assert!(err.to_string().contains("submissions in flight"));
    assert_eq!(gpu.violations().len(), 1);

    // The refused destroy left the device usable
    engine.destroy(&mut gpu).unwrap();
    gpu.destroy_device().unwrap();
    assert_eq!(gpu.violations().len(), 1);
}

#[test]
fn drain_waits_only_on_submitted_slots() {
    let mut gpu = MockGpu::new(2, Completion::Manual);
    let config = FrameConfig::default().with_fence_timeout(Duration::from_millis(1));
    let mut engine = FrameEngine::new(&mut gpu, config).unwrap();

    // Nothing submitted: drain never touches a fence
    engine.drain(&mut gpu).unwrap();
    assert!(gpu.log().is_empty());

    run_frames(&mut gpu, &mut engine, 1);
    assert_eq!(engine.slot_state(0), Some(SlotState::Submitted));
    assert_eq!(engine.slot_state(1), Some(SlotState::Idle));

    assert!(matches!(
        engine.drain(&mut gpu),
        Err(GpuError::FenceTimeout { slot: 0, .. })
    ));

    gpu.complete_all();
    engine.drain(&mut gpu).unwrap();
    assert_eq!(engine.in_flight_count(), 0);
    assert_eq!(engine.slot_state(0), Some(SlotState::Idle));
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn halted_engine_still_tears_down_cleanly() {
    let mut gpu = MockGpu::new(3, Completion::OnWait);
    let mut engine = FrameEngine::new(&mut gpu, FrameConfig::default()).unwrap();
    run_frames(&mut gpu, &mut engine, 2);

    gpu.fail_next(FailurePoint::Present, vk::Result::ERROR_SURFACE_LOST_KHR);
    let mut body = RecordingBody::new();
    assert!(engine.draw_frame(&mut gpu, &mut body).is_err());
    assert!(engine.is_halted());

    engine.destroy(&mut gpu).unwrap();
    gpu.destroy_device().unwrap();
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn lifecycle_tracks_the_engine_teardown() {
    let mut gpu = MockGpu::new(2, Completion::OnWait);
    let mut lifecycle = Lifecycle::new();
    for stage in [Stage::Instance, Stage::Surface, Stage::Device, Stage::Swapchain] {
        lifecycle.enter(stage).unwrap();
    }

    let mut engine = FrameEngine::new(&mut gpu, FrameConfig::default()).unwrap();
    lifecycle.enter(Stage::FrameEngine).unwrap();
    run_frames(&mut gpu, &mut engine, 2);
    lifecycle.note_submission();

    // Work is in flight: no stage may go yet
    assert!(matches!(
        lifecycle.exit(Stage::FrameEngine),
        Err(GpuError::TeardownOrder(_))
    ));
    // Out of order even once idle
    gpu.wait_idle().unwrap();
    lifecycle.mark_device_idle();
    let err = lifecycle.exit(Stage::Device).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Teardown order violated: cannot destroy device while frame engine is live"
    );

    lifecycle.exit(Stage::FrameEngine).unwrap();
    engine.destroy(&mut gpu).unwrap();
    for stage in [Stage::Swapchain, Stage::Device] {
        lifecycle.exit(stage).unwrap();
    }
    gpu.destroy_device().unwrap();
    assert_eq!(lifecycle.live_stages(), &[Stage::Instance, Stage::Surface]);
}

#[test]
fn failed_engine_teardown_abandons_the_chain() {
    let mut gpu = MockGpu::new(2, Completion::OnWait);
    let mut lifecycle = Lifecycle::new();
    for stage in [Stage::Instance, Stage::Surface, Stage::Device, Stage::Swapchain] {
        lifecycle.enter(stage).unwrap();
    }
    let mut engine = FrameEngine::new(&mut gpu, FrameConfig::default()).unwrap();
    lifecycle.enter(Stage::FrameEngine).unwrap();
    run_frames(&mut gpu, &mut engine, 2);

    lifecycle.mark_device_idle();
    lifecycle.exit(Stage::FrameEngine).unwrap();
    gpu.fail_next(FailurePoint::WaitIdle, vk::Result::ERROR_DEVICE_LOST);
    let err = engine.destroy(&mut gpu).unwrap_err();
    assert!(matches!(err, GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST)));
    lifecycle.abandon(err.to_string());

    // A retry would destroy the swapchain under an engine that never released it
    assert!(matches!(
        lifecycle.exit(Stage::Swapchain),
        Err(GpuError::TeardownOrder(_))
    ));
    assert!(lifecycle.is_abandoned());
    assert_eq!(lifecycle.top(), Some(Stage::Swapchain));
    assert!(gpu.destroy_device().is_err());
}
