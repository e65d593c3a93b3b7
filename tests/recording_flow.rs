//! End-to-end recording lifecycle against an in-process server fake.
//!
//! The display loop is replaced by driving `FrameCapture` directly with
//! synthetic clock values, so the number of captured frames is exact.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use camrec_lib::camera::capture::{CaptureControl, CaptureOutcome, FrameCapture, FrameEncoder};
use camrec_lib::camera::display::Canvas;
use camrec_lib::camera::errors::RecorderError;
use camrec_lib::camera::recorder::{
    CoordinatorHandle, RecorderConfig, RecordingCoordinator,
};
use camrec_lib::camera::types::FinalizeStrategy;
use common::{tagged_frame, FakeCameraApi};

const CAPTURE_FPS: f64 = 10.0;

fn spawn_recorder(
    api: Arc<FakeCameraApi>,
    strategy: FinalizeStrategy,
    output_dir: &std::path::Path,
) -> (CoordinatorHandle, watch::Receiver<CaptureControl>) {
    let config = RecorderConfig::new(0, strategy, output_dir.to_path_buf());
    let (coordinator, handle, control_rx) = RecordingCoordinator::new(api, config);
    tokio::spawn(coordinator.run());
    (handle, control_rx)
}

/// Offers frames tagged `first..first + count` at the capture rate.
fn capture_frames(capture: &mut FrameCapture, start: Instant, first: u8, count: u8) -> Instant {
    let interval = Duration::from_millis(100);
    let mut canvas = Canvas::default();

    // Arms the gate for the session
    canvas.draw(tagged_frame(255), 2, 2);
    capture.offer(&canvas, start);

    let mut now = start;
    for i in first..first + count {
        now += interval;
        canvas.draw(tagged_frame(i), 2, 2);
        assert_eq!(capture.offer(&canvas, now), CaptureOutcome::Captured);
    }
    now
}

fn output_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_recorded_frames_are_saved_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeCameraApi::new());
    let (handle, control_rx) = spawn_recorder(api, FinalizeStrategy::Local, tmp.path());
    let mut capture = FrameCapture::new(control_rx, CAPTURE_FPS, FrameEncoder::Passthrough);

    handle.start().await.unwrap();
    assert!(handle.status().await.is_recording);

    capture_frames(&mut capture, Instant::now(), 0, 7);

    let artifact = handle.stop().await.unwrap();
    assert_eq!(artifact.frame_count, 7);
    assert_eq!(artifact.strategy, FinalizeStrategy::Local);

    let name = artifact.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("video_cam_0_"), "{}", name);
    assert!(name.ends_with(".mjpeg"), "{}", name);

    let expected: Vec<u8> = (0..7u8).flat_map(|i| tagged_frame(i).to_vec()).collect();
    assert_eq!(std::fs::read(&artifact.path).unwrap(), expected);
    assert_eq!(artifact.bytes, expected.len() as u64);

    let status = handle.status().await;
    assert!(!status.is_recording && !status.is_stopping);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_stop_without_start_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeCameraApi::new());
    let (handle, _control_rx) = spawn_recorder(api, FinalizeStrategy::Local, tmp.path());

    assert_eq!(handle.stop().await, Err(RecorderError::NotRecording));
    assert!(output_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_second_start_keeps_running_session() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeCameraApi::new());
    let (handle, control_rx) = spawn_recorder(api, FinalizeStrategy::Local, tmp.path());
    let mut capture = FrameCapture::new(control_rx, CAPTURE_FPS, FrameEncoder::Passthrough);

    handle.start().await.unwrap();
    let now = capture_frames(&mut capture, Instant::now(), 0, 3);

    assert_eq!(handle.start().await, Err(RecorderError::AlreadyRecording));

    // Same session, the gate is not re-armed
    let mut canvas = Canvas::default();
    canvas.draw(tagged_frame(3), 2, 2);
    assert_eq!(
        capture.offer(&canvas, now + Duration::from_millis(100)),
        CaptureOutcome::Captured
    );

    let artifact = handle.stop().await.unwrap();
    assert_eq!(artifact.frame_count, 4);

    let expected: Vec<u8> = (0..4u8).flat_map(|i| tagged_frame(i).to_vec()).collect();
    assert_eq!(std::fs::read(&artifact.path).unwrap(), expected);
}

#[tokio::test]
async fn test_zero_frames_produces_no_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeCameraApi::new());
    let (handle, _control_rx) =
        spawn_recorder(api.clone(), FinalizeStrategy::Remote, tmp.path());

    handle.start().await.unwrap();
    assert_eq!(handle.stop().await, Err(RecorderError::NoFramesCaptured));

    assert_eq!(api.upload_count(), 0);
    assert!(api.downloads.lock().unwrap().is_empty());
    assert!(output_files(tmp.path()).is_empty());

    let status = handle.status().await;
    assert!(!status.is_recording);
    assert_eq!(status.last_error.as_deref(), Some("No frames were captured"));

    // The recorder is usable again
    handle.start().await.unwrap();
}

#[tokio::test]
async fn test_capture_stops_with_recording() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeCameraApi::new());
    let (handle, control_rx) = spawn_recorder(api, FinalizeStrategy::Local, tmp.path());
    let mut capture = FrameCapture::new(control_rx.clone(), CAPTURE_FPS, FrameEncoder::Passthrough);

    handle.start().await.unwrap();
    assert!(control_rx.borrow().is_active());
    let now = capture_frames(&mut capture, Instant::now(), 0, 2);
    handle.stop().await.unwrap();

    assert!(!control_rx.borrow().is_active());
    let mut canvas = Canvas::default();
    canvas.draw(tagged_frame(9), 2, 2);
    assert_eq!(
        capture.offer(&canvas, now + Duration::from_secs(1)),
        CaptureOutcome::Inactive
    );
}

#[tokio::test]
async fn test_elapsed_resets_after_stop() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeCameraApi::new());
    let (handle, control_rx) = spawn_recorder(api, FinalizeStrategy::Local, tmp.path());
    let mut capture = FrameCapture::new(control_rx, CAPTURE_FPS, FrameEncoder::Passthrough);
    let mut elapsed = handle.elapsed();

    handle.start().await.unwrap();
    capture_frames(&mut capture, Instant::now(), 0, 1);

    tokio::time::timeout(Duration::from_secs(3), elapsed.wait_for(|secs| *secs >= 1))
        .await
        .expect("elapsed should tick")
        .unwrap();

    handle.stop().await.unwrap();
    assert_eq!(*handle.elapsed().borrow(), 0);
}

#[tokio::test]
async fn test_start_fails_when_worker_is_gone() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeCameraApi::new());
    let config = RecorderConfig::new(0, FinalizeStrategy::Local, tmp.path().to_path_buf());

    let (worker_tx, worker_rx) = mpsc::unbounded_channel();
    drop(worker_rx);
    let (_response_tx, response_rx) = mpsc::channel(4);

    let (coordinator, handle, control_rx) =
        RecordingCoordinator::with_worker(api, config, worker_tx, response_rx);
    tokio::spawn(coordinator.run());

    let result = handle.start().await;
    assert!(matches!(result, Err(RecorderError::CaptureUnavailable(_))));
    assert!(!control_rx.borrow().is_active());
    assert!(!handle.status().await.is_starting);
}

#[tokio::test]
async fn test_start_times_out_without_acknowledgement() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeCameraApi::new());
    let mut config = RecorderConfig::new(0, FinalizeStrategy::Local, tmp.path().to_path_buf());
    config.start_timeout = Duration::from_millis(100);

    // Worker that never answers
    let (worker_tx, _worker_rx) = mpsc::unbounded_channel();
    let (_response_tx, response_rx) = mpsc::channel(4);

    let (coordinator, handle, _control_rx) =
        RecordingCoordinator::with_worker(api, config, worker_tx, response_rx);
    tokio::spawn(coordinator.run());

    let result = tokio::time::timeout(Duration::from_secs(5), handle.start())
        .await
        .expect("start should give up on its own");
    assert!(matches!(result, Err(RecorderError::CaptureUnavailable(_))));
}

#[tokio::test]
async fn test_handle_reports_stopped_coordinator() {
    let tmp = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeCameraApi::new());
    let config = RecorderConfig::new(0, FinalizeStrategy::Local, tmp.path().to_path_buf());
    let (coordinator, handle, _control_rx) = RecordingCoordinator::new(api, config);
    drop(coordinator);

    assert_eq!(handle.start().await, Err(RecorderError::CoordinatorUnavailable));
    assert!(handle.status().await.last_error.is_some());
}
