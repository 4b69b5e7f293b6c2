//! Frame loop behavior against the mock GPU.

use std::time::Duration;

use ash::vk::{self, Handle};
use swapframe_core::constants::FRAME_COUNT;
use swapframe_gpu::{FrameConfig, FrameEngine, FrameStatus, GpuError, PresentedFrame, SlotState};
use swapframe_test::{Completion, FailingBody, FailurePoint, MockGpu, RecordingBody};

fn presented(status: swapframe_gpu::Result<FrameStatus>) -> PresentedFrame {
    match status {
        Ok(FrameStatus::Presented(frame)) => frame,
        other => panic!("expected a presented frame, got {other:?}"),
    }
}

fn setup(image_count: u32, completion: Completion) -> (MockGpu, FrameEngine) {
    let mut gpu = MockGpu::new(image_count, completion);
    let engine = FrameEngine::new(&mut gpu, FrameConfig::default()).unwrap();
    (gpu, engine)
}

#[test]
fn three_frames_follow_the_sync_protocol() {
    let (mut gpu, mut engine) = setup(2, Completion::OnWait);
    let mut body = RecordingBody::new();

    for _ in 0..3 {
        presented(engine.draw_frame(&mut gpu, &mut body));
    }

    insta::assert_snapshot!(gpu.log().join("\n"), @r"
    wait fence#6
    reset fence#6
    acquire image#0 -> sem#4
    begin cmd#2
    end cmd#2
    submit cmd#2 wait sem#4 signal sem#5 fence#6
    present image#0 wait sem#5
    wait fence#9
    reset fence#9
    acquire image#1 -> sem#7
    begin cmd#3
    end cmd#3
    submit cmd#3 wait sem#7 signal sem#8 fence#9
    present image#1 wait sem#8
    complete cmd#2
    wait fence#6 (stalled)
    reset fence#6
    acquire image#0 -> sem#4
    begin cmd#2
    end cmd#2
    submit cmd#2 wait sem#4 signal sem#5 fence#6
    present image#0 wait sem#5
    ");
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn only_the_first_frames_skip_the_fence_stall() {
    let (mut gpu, mut engine) = setup(2, Completion::OnWait);
    let mut body = RecordingBody::new();

    presented(engine.draw_frame(&mut gpu, &mut body));
    presented(engine.draw_frame(&mut gpu, &mut body));
    assert_eq!(gpu.stalls(), 0);
    assert_eq!(engine.stats().fence_stalls, 0);

    presented(engine.draw_frame(&mut gpu, &mut body));
    assert_eq!(gpu.stalls(), 1);
    assert_eq!(engine.stats().fence_stalls, 1);
}

#[test]
fn cpu_never_runs_more_than_two_frames_ahead() {
    let (mut gpu, mut engine) = setup(3, Completion::OnWait);
    let mut body = RecordingBody::new();
    let frames = 20u64;

    for _ in 0..frames {
        presented(engine.draw_frame(&mut gpu, &mut body));
        assert!(engine.in_flight_count() <= FRAME_COUNT);
    }

    assert_eq!(gpu.max_in_flight(), FRAME_COUNT);
    assert_eq!(gpu.stalls(), frames - FRAME_COUNT as u64);
    assert_eq!(engine.stats().frames_presented, frames);
    assert_eq!(engine.frame_counter(), frames);
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn slots_alternate_independently_of_image_indices() {
    for image_count in [2, 3] {
        let (mut gpu, mut engine) = setup(image_count, Completion::OnWait);
        let mut body = RecordingBody::new();

        for n in 0..7u64 {
            let frame = presented(engine.draw_frame(&mut gpu, &mut body));
            assert_eq!(frame.frame_number, n);
            assert_eq!(frame.slot, (n % FRAME_COUNT as u64) as usize);
            assert!(frame.image_index < image_count);
        }

        let images: Vec<u32> = body.frames.iter().map(|f| f.image_index).collect();
        let expected: Vec<u32> = (0..7).map(|n| n % image_count).collect();
        assert_eq!(images, expected);
    }
}

#[test]
fn body_records_into_an_open_command_buffer() {
    let (mut gpu, mut engine) = setup(3, Completion::OnWait);
    let mut body = RecordingBody::new().with_wait_stage(vk::PipelineStageFlags::TRANSFER);

    for _ in 0..4 {
        presented(engine.draw_frame(&mut gpu, &mut body));
    }

    assert_eq!(body.frames.len(), 4);
    assert_eq!(body.last().map(|f| (f.frame_number, f.slot)), Some((3, 1)));
    for frame in &body.frames {
        assert_eq!(frame.image.as_raw(), 0x100 + u64::from(frame.image_index));
    }
    // Slot 0 owns the first command buffer allocated from the pool
    assert_eq!(body.frames[0].command_buffer, body.frames[2].command_buffer);
    assert_ne!(body.frames[0].command_buffer, body.frames[1].command_buffer);
    for frame in &body.frames {
        assert!(!gpu.is_recording(frame.command_buffer));
    }
}

#[test]
fn fatal_failures_halt_the_engine() {
    let cases = [
        (FailurePoint::Acquire, vk::Result::ERROR_OUT_OF_DATE_KHR),
        (FailurePoint::Submit, vk::Result::ERROR_DEVICE_LOST),
        (FailurePoint::Present, vk::Result::ERROR_SURFACE_LOST_KHR),
        (FailurePoint::FenceWait, vk::Result::ERROR_DEVICE_LOST),
    ];

    for (point, result) in cases {
        let (mut gpu, mut engine) = setup(2, Completion::OnWait);
        let mut body = RecordingBody::new();
        presented(engine.draw_frame(&mut gpu, &mut body));

        gpu.fail_next(point, result);
        let err = engine.draw_frame(&mut gpu, &mut body).unwrap_err();
        match (point, &err) {
            (FailurePoint::Acquire, GpuError::AcquireFailure(r))
            | (FailurePoint::Submit, GpuError::SubmitFailure(r))
            | (FailurePoint::Present, GpuError::PresentFailure(r))
            | (FailurePoint::FenceWait, GpuError::Vulkan(r)) => assert_eq!(*r, result),
            _ => panic!("{point:?} produced {err:?}"),
        }
        assert!(!err.is_recoverable());
        assert!(engine.is_halted());
        assert_eq!(engine.halt_reason(), Some(err.to_string().as_str()));

        let frames_before = body.frames.len();
        assert!(matches!(
            engine.draw_frame(&mut gpu, &mut body),
            Err(GpuError::Halted(_))
        ));
        assert_eq!(body.frames.len(), frames_before);
        assert_eq!(engine.stats().frames_presented, 1);
    }
}

#[test]
fn record_failure_halts_the_engine() {
    let (mut gpu, mut engine) = setup(2, Completion::OnWait);
    let mut body = FailingBody::on_frame(1);

    presented(engine.draw_frame(&mut gpu, &mut body));
    assert!(matches!(
        engine.draw_frame(&mut gpu, &mut body),
        Err(GpuError::RecordFailure(_))
    ));
    assert_eq!(engine.in_flight_count(), 1);
    assert!(!gpu.log().iter().any(|line| line.starts_with("submit cmd#3")));

    assert!(matches!(
        engine.draw_frame(&mut gpu, &mut body),
        Err(GpuError::Halted(_))
    ));
}

#[test]
fn fence_timeout_is_recoverable() {
    let mut gpu = MockGpu::new(2, Completion::Manual);
    let config = FrameConfig::default().with_fence_timeout(Duration::from_millis(1));
    let mut engine = FrameEngine::new(&mut gpu, config).unwrap();
    let mut body = RecordingBody::new();

    presented(engine.draw_frame(&mut gpu, &mut body));
    presented(engine.draw_frame(&mut gpu, &mut body));

    let err = engine.draw_frame(&mut gpu, &mut body).unwrap_err();
    assert!(matches!(
        err,
        GpuError::FenceTimeout {
            slot: 0,
            timeout_ns: 1_000_000
        }
    ));
    assert!(err.is_recoverable());
    assert!(!engine.is_halted());
    assert_eq!(engine.frame_counter(), 2);
    assert_eq!(engine.slot_state(0), Some(SlotState::Submitted));
    assert_eq!(body.frames.len(), 2);

    assert!(gpu.complete_next());
    let frame = presented(engine.draw_frame(&mut gpu, &mut body));
    assert_eq!((frame.frame_number, frame.slot), (2, 0));
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn acquire_timeout_is_recoverable() {
    let mut gpu = MockGpu::new(2, Completion::OnWait);
    let config = FrameConfig::default().with_acquire_timeout(Duration::from_millis(1));
    let mut engine = FrameEngine::new(&mut gpu, config).unwrap();
    let mut body = RecordingBody::new();
    presented(engine.draw_frame(&mut gpu, &mut body));

    gpu.withhold_images(true);
    let err = engine.draw_frame(&mut gpu, &mut body).unwrap_err();
    assert!(matches!(
        err,
        GpuError::AcquireTimeout {
            timeout_ns: 1_000_000
        }
    ));
    assert!(err.is_recoverable());
    assert!(!engine.is_halted());
    assert_eq!(engine.frame_counter(), 1);
    assert_eq!(engine.slot_state(1), Some(SlotState::Recording));
    assert_eq!(body.frames.len(), 1);

    // Same slot again: its fence is already reset, so only the acquire repeats
    gpu.withhold_images(false);
    let frame = presented(engine.draw_frame(&mut gpu, &mut body));
    assert_eq!((frame.frame_number, frame.slot), (1, 1));
    let resets = gpu
        .log()
        .iter()
        .filter(|line| *line == "reset fence#9")
        .count();
    assert_eq!(resets, 1);

    engine.destroy(&mut gpu).unwrap();
    gpu.destroy_device().unwrap();
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn out_of_range_image_index_halts_the_engine() {
    let (mut gpu, mut engine) = setup(2, Completion::OnWait);
    let mut body = RecordingBody::new();
    presented(engine.draw_frame(&mut gpu, &mut body));

    gpu.force_next_image(5);
    let err = engine.draw_frame(&mut gpu, &mut body).unwrap_err();
    assert!(matches!(err, GpuError::InvalidState(_)));
    assert!(err.to_string().contains("acquired image 5"));
    assert!(engine.is_halted());
    assert_eq!(engine.frame_counter(), 1);
    assert_eq!(body.frames.len(), 1);
    assert!(!gpu.log().iter().any(|line| line.starts_with("submit cmd#3")));

    assert!(matches!(
        engine.draw_frame(&mut gpu, &mut body),
        Err(GpuError::Halted(_))
    ));

    engine.destroy(&mut gpu).unwrap();
    gpu.destroy_device().unwrap();
    assert!(gpu.violations().is_empty(), "{:?}", gpu.violations());
}

#[test]
fn shutdown_cancels_before_touching_the_gpu() {
    let (mut gpu, mut engine) = setup(2, Completion::OnWait);
    let mut body = RecordingBody::new();
    presented(engine.draw_frame(&mut gpu, &mut body));

    let signal = engine.shutdown_signal();
    signal.request();
    let log_len = gpu.log().len();

    assert_eq!(
        engine.draw_frame(&mut gpu, &mut body).unwrap(),
        FrameStatus::Cancelled
    );
    assert_eq!(engine.frame_counter(), 1);
    assert_eq!(gpu.log().len(), log_len);
    assert!(!engine.is_halted());
}

#[test]
fn suboptimal_frames_are_presented_and_counted() {
    let (mut gpu, mut engine) = setup(2, Completion::OnWait);
    let mut body = RecordingBody::new();

    presented(engine.draw_frame(&mut gpu, &mut body));
    gpu.set_suboptimal(true);
    for _ in 0..3 {
        let frame = presented(engine.draw_frame(&mut gpu, &mut body));
        assert!(frame.suboptimal);
    }

    let stats = engine.stats();
    assert_eq!(stats.frames_presented, 4);
    assert_eq!(stats.suboptimal_frames, 3);
    assert!(!engine.is_halted());
}
