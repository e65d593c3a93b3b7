//! RecordingCoordinator - single owner actor for the recording lifecycle.
//!
//! The coordinator owns the session, the capture switch, the elapsed timer and
//! the frame sequence once the worker hands it over. Nothing else mutates
//! recording state.
//!
//! - The console sends Commands via `CoordinatorHandle`
//! - The capture worker answers on its response channel
//! - Finalization tasks report back via event_tx
//! - State changes are published on a watch channel

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::finalize::{finalize, Artifact, FinalizeContext};
use super::state::{transition, RecordingEvent, RecordingState, SideEffect};
use super::timer::{format_elapsed, RecordingTimer};
use crate::camera::capture::worker::{spawn_capture_worker, WorkerMessage, WorkerResponse};
use crate::camera::capture::CaptureControl;
use crate::camera::client::CameraApi;
use crate::camera::errors::RecorderError;
use crate::camera::types::{FinalizeStrategy, FrameSequence, DEFAULT_UPLOAD_BATCH_SIZE};

/// Commands sent from the console to the coordinator.
#[derive(Debug)]
pub enum Command {
    Start {
        response_tx: oneshot::Sender<Result<(), RecorderError>>,
    },
    Stop {
        response_tx: oneshot::Sender<Result<Artifact, RecorderError>>,
    },
    Status {
        response_tx: oneshot::Sender<RecordingStatus>,
    },
}

/// Events sent from finalization tasks to the coordinator.
#[derive(Debug)]
pub enum WorkerEvent {
    FinalizeCompleted { artifact: Artifact },
    FinalizeFailed { error: RecorderError },
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub camera: u32,
    pub strategy: FinalizeStrategy,
    pub output_dir: PathBuf,
    pub upload_batch_size: usize,
    pub start_timeout: Duration,
}

impl RecorderConfig {
    pub fn new(camera: u32, strategy: FinalizeStrategy, output_dir: PathBuf) -> Self {
        Self {
            camera,
            strategy,
            output_dir,
            upload_batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
            start_timeout: Duration::from_secs(2),
        }
    }
}

/// Recording status for the console.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub is_recording: bool,
    pub is_starting: bool,
    pub is_stopping: bool,
    pub frame_count: u64,
    pub capture_fps: u32,
    pub elapsed_seconds: f64,
    pub elapsed_display: String,
    pub last_error: Option<String>,
    pub started_at_timestamp: Option<f64>,
}

impl RecordingStatus {
    fn unavailable(reason: &str) -> Self {
        Self {
            elapsed_display: format_elapsed(0),
            last_error: Some(reason.to_string()),
            ..Self::default()
        }
    }
}

/// Data for the active recording.
struct RecordingSession {
    id: Uuid,
}

pub struct RecordingCoordinator {
    api: Arc<dyn CameraApi>,
    config: RecorderConfig,
    state: RecordingState,
    session: Option<RecordingSession>,
    worker_tx: mpsc::UnboundedSender<WorkerMessage>,
    worker_rx: mpsc::Receiver<WorkerResponse>,
    worker_closed: bool,
    control_tx: watch::Sender<CaptureControl>,
    status_tx: watch::Sender<RecordingStatus>,
    elapsed_tx: Arc<watch::Sender<u64>>,
    timer: Option<RecordingTimer>,
    start_deadline: Option<tokio::time::Instant>,
    pending_start_response: Option<oneshot::Sender<Result<(), RecorderError>>>,
    pending_stop_response: Option<oneshot::Sender<Result<Artifact, RecorderError>>>,
    captured: Option<FrameSequence>,
    artifact: Option<Artifact>,
    last_error: Option<String>,
    command_rx: mpsc::Receiver<Command>,
    event_rx: mpsc::Receiver<WorkerEvent>,
    event_tx: mpsc::Sender<WorkerEvent>,
}

impl RecordingCoordinator {
    /// Spawns a capture worker and wires a coordinator to it.
    pub fn new(
        api: Arc<dyn CameraApi>,
        config: RecorderConfig,
    ) -> (Self, CoordinatorHandle, watch::Receiver<CaptureControl>) {
        let (worker_tx, worker_rx, _worker) = spawn_capture_worker();
        Self::with_worker(api, config, worker_tx, worker_rx)
    }

    /// Wires a coordinator to an already running capture worker.
    pub fn with_worker(
        api: Arc<dyn CameraApi>,
        config: RecorderConfig,
        worker_tx: mpsc::UnboundedSender<WorkerMessage>,
        worker_rx: mpsc::Receiver<WorkerResponse>,
    ) -> (Self, CoordinatorHandle, watch::Receiver<CaptureControl>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let (control_tx, control_rx) = watch::channel(CaptureControl::Idle);
        let (status_tx, status_rx) = watch::channel(RecordingStatus {
            elapsed_display: format_elapsed(0),
            ..RecordingStatus::default()
        });
        let (elapsed_tx, elapsed_rx) = watch::channel(0);

        let coordinator = Self {
            api,
            config,
            state: RecordingState::Idle,
            session: None,
            worker_tx,
            worker_rx,
            worker_closed: false,
            control_tx,
            status_tx,
            elapsed_tx: Arc::new(elapsed_tx),
            timer: None,
            start_deadline: None,
            pending_start_response: None,
            pending_stop_response: None,
            captured: None,
            artifact: None,
            last_error: None,
            command_rx,
            event_rx,
            event_tx,
        };

        let handle = CoordinatorHandle {
            command_tx,
            status_rx,
            elapsed_rx,
        };

        (coordinator, handle, control_rx)
    }

    /// Main event loop. Run this as a tokio task.
    pub async fn run(mut self) {
        tracing::info!(target: "recorder", "[COORDINATOR] Starting event loop");

        loop {
            let deadline = self.start_deadline;

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            tracing::info!(target: "recorder", "[COORDINATOR] All handles dropped, shutting down");
                            break;
                        }
                    }
                }
                response = self.worker_rx.recv(), if !self.worker_closed => {
                    match response {
                        Some(response) => self.handle_worker_response(response),
                        None => {
                            tracing::error!(target: "recorder", "[COORDINATOR] Capture worker exited");
                            self.worker_closed = true;
                            self.dispatch(RecordingEvent::CaptureFailed {
                                error: RecorderError::CaptureUnavailable(
                                    "capture worker exited".to_string(),
                                ),
                            });
                        }
                    }
                }
                Some(event) = self.event_rx.recv() => {
                    self.handle_worker_event(event);
                }
                _ = sleep_until_deadline(deadline) => {
                    self.start_deadline = None;
                    tracing::error!(target: "recorder", "[COORDINATOR] Capture worker did not acknowledge start");
                    self.dispatch(RecordingEvent::CaptureFailed {
                        error: RecorderError::CaptureUnavailable(format!(
                            "capture worker did not respond within {:?}",
                            self.config.start_timeout
                        )),
                    });
                }
            }
        }

        self.cleanup();
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { response_tx } => self.handle_start(response_tx),
            Command::Stop { response_tx } => self.handle_stop(response_tx),
            Command::Status { response_tx } => {
                let _ = response_tx.send(self.get_status());
            }
        }
    }

    fn handle_start(&mut self, response_tx: oneshot::Sender<Result<(), RecorderError>>) {
        if self.state.is_active() {
            let _ = response_tx.send(Err(RecorderError::AlreadyRecording));
            return;
        }

        self.pending_start_response = Some(response_tx);
        self.last_error = None;
        self.dispatch(RecordingEvent::StartRequested);
    }

    fn handle_stop(&mut self, response_tx: oneshot::Sender<Result<Artifact, RecorderError>>) {
        if !self.state.is_recording() {
            let _ = response_tx.send(Err(RecorderError::NotRecording));
            return;
        }

        self.pending_stop_response = Some(response_tx);
        self.dispatch(RecordingEvent::StopRequested);
    }

    fn handle_worker_response(&mut self, response: WorkerResponse) {
        let event = match response {
            WorkerResponse::Started => RecordingEvent::CaptureStarted,
            WorkerResponse::Progress { count, fps } => {
                tracing::debug!(target: "recorder", "[COORDINATOR] {} frames stored ({} fps)", count, fps);
                RecordingEvent::Progress { count, fps }
            }
            WorkerResponse::Complete { frames, count } => {
                if !matches!(self.state, RecordingState::Stopping { .. }) {
                    tracing::debug!(target: "recorder", "[COORDINATOR] Ignoring stray completion");
                    return;
                }
                self.captured = Some(frames);
                RecordingEvent::CaptureCompleted { count }
            }
        };

        self.dispatch(event);
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        let recording_event = match event {
            WorkerEvent::FinalizeCompleted { artifact } => {
                self.artifact = Some(artifact);
                RecordingEvent::FinalizeCompleted
            }
            WorkerEvent::FinalizeFailed { error } => RecordingEvent::FinalizeFailed { error },
        };

        self.dispatch(recording_event);
    }

    /// Runs an event through the state machine, including any follow-up
    /// events produced while executing its effects.
    fn dispatch(&mut self, event: RecordingEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let (new_state, effects) = transition(self.state.clone(), event);
            self.state = new_state;

            for effect in effects {
                if let Some(follow_up) = self.execute_effect(effect) {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    fn execute_effect(&mut self, effect: SideEffect) -> Option<RecordingEvent> {
        match effect {
            SideEffect::SignalCaptureStart => return self.signal_capture_start(),
            SideEffect::ActivateCapture => self.activate_capture(),
            SideEffect::StartTimer { started_at } => {
                self.timer = Some(RecordingTimer::start(started_at, self.elapsed_tx.clone()));
            }
            SideEffect::DeactivateCapture => {
                self.control_tx.send_replace(CaptureControl::Idle);
            }
            SideEffect::StopTimer => {
                self.timer = None;
            }
            SideEffect::SignalCaptureStop => return self.signal_capture_stop(),
            SideEffect::Finalize { elapsed } => self.start_finalize(elapsed),
            SideEffect::Report { error } => self.report(error),
            SideEffect::DeliverArtifact => self.deliver_artifact(),
            SideEffect::EmitStateChange { state } => self.emit_state_change(&state),
        }
        None
    }

    fn signal_capture_start(&mut self) -> Option<RecordingEvent> {
        if self.worker_tx.send(WorkerMessage::Start).is_err() {
            return Some(RecordingEvent::CaptureFailed {
                error: RecorderError::CaptureUnavailable(
                    "capture worker is not running".to_string(),
                ),
            });
        }

        self.session = Some(RecordingSession { id: Uuid::new_v4() });
        self.start_deadline = Some(tokio::time::Instant::now() + self.config.start_timeout);
        None
    }

    fn activate_capture(&mut self) {
        self.start_deadline = None;

        let Some(session) = &self.session else {
            tracing::error!(target: "recorder", "[COORDINATOR] No session for activate_capture");
            return;
        };

        self.control_tx.send_replace(CaptureControl::Active {
            session: session.id,
            sink: self.worker_tx.clone(),
        });

        if let Some(response_tx) = self.pending_start_response.take() {
            let _ = response_tx.send(Ok(()));
        }

        tracing::info!(target: "recorder", "[COORDINATOR] Recording started: session={}", session.id);
    }

    fn signal_capture_stop(&mut self) -> Option<RecordingEvent> {
        tracing::info!(target: "recorder", "[COORDINATOR] Signaling stop...");

        if self.worker_tx.send(WorkerMessage::Stop).is_err() {
            return Some(RecordingEvent::CaptureFailed {
                error: RecorderError::CaptureUnavailable(
                    "capture worker is not running".to_string(),
                ),
            });
        }
        None
    }

    fn start_finalize(&mut self, elapsed: Duration) {
        let frames = self.captured.take().unwrap_or_default();
        let ctx = FinalizeContext {
            camera: self.config.camera,
            elapsed,
            finished_at: Utc::now(),
            output_dir: self.config.output_dir.clone(),
            batch_size: self.config.upload_batch_size,
        };
        let strategy = self.config.strategy;
        let api = self.api.clone();
        let event_tx = self.event_tx.clone();

        tracing::info!(target: "recorder",
            "[COORDINATOR] Finalizing {} frames ({:.1}s) with {} strategy",
            frames.len(), elapsed.as_secs_f64(), strategy);

        tokio::spawn(async move {
            let event = match finalize(strategy, api.as_ref(), &frames, &ctx).await {
                Ok(artifact) => WorkerEvent::FinalizeCompleted { artifact },
                Err(error) => WorkerEvent::FinalizeFailed { error },
            };
            let _ = event_tx.send(event).await;
        });
    }

    fn report(&mut self, error: RecorderError) {
        tracing::error!(target: "recorder", "[COORDINATOR] {}", error);

        self.last_error = Some(error.to_string());
        self.start_deadline = None;
        self.session = None;
        self.captured = None;

        if let Some(response_tx) = self.pending_start_response.take() {
            let _ = response_tx.send(Err(error));
        } else if let Some(response_tx) = self.pending_stop_response.take() {
            let _ = response_tx.send(Err(error));
        }
    }

    fn deliver_artifact(&mut self) {
        self.session = None;

        let Some(artifact) = self.artifact.take() else {
            tracing::error!(target: "recorder", "[COORDINATOR] No artifact to deliver");
            return;
        };

        tracing::info!(target: "recorder",
            "[COORDINATOR] Recording saved: {:?} ({} frames, {} fps)",
            artifact.path, artifact.frame_count, artifact.fps);

        if let Some(response_tx) = self.pending_stop_response.take() {
            let _ = response_tx.send(Ok(artifact));
        }
    }

    fn emit_state_change(&self, state: &RecordingState) {
        let status = self.build_status_from_state(state);
        tracing::debug!(target: "recorder", "[COORDINATOR] State change: {:?}", status);
        self.status_tx.send_replace(status);
    }

    fn build_status_from_state(&self, state: &RecordingState) -> RecordingStatus {
        let elapsed = state.elapsed().unwrap_or_default();

        let started_at_timestamp = state.started_at().map(|instant| {
            let start_system_time = SystemTime::now() - instant.elapsed();
            start_system_time
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64()
        });

        let (frame_count, capture_fps) = match state {
            RecordingState::Recording {
                frame_count,
                capture_fps,
                ..
            } => (*frame_count, *capture_fps),
            _ => (0, 0),
        };

        RecordingStatus {
            is_recording: state.is_recording(),
            is_starting: matches!(state, RecordingState::Starting { .. }),
            is_stopping: matches!(state, RecordingState::Stopping { .. }),
            frame_count,
            capture_fps,
            elapsed_seconds: elapsed.as_secs_f64(),
            elapsed_display: format_elapsed(elapsed.as_secs()),
            last_error: self.last_error.clone(),
            started_at_timestamp,
        }
    }

    fn cleanup(&mut self) {
        tracing::info!(target: "recorder", "[COORDINATOR] Cleaning up resources...");

        self.control_tx.send_replace(CaptureControl::Idle);
        self.timer = None;
        self.start_deadline = None;

        if let Some(response_tx) = self.pending_start_response.take() {
            let _ = response_tx.send(Err(RecorderError::CoordinatorUnavailable));
        }

        if let Some(response_tx) = self.pending_stop_response.take() {
            let _ = response_tx.send(Err(RecorderError::CoordinatorUnavailable));
        }

        self.state = RecordingState::Idle;
        self.emit_state_change(&RecordingState::Idle);
    }

    fn get_status(&self) -> RecordingStatus {
        self.build_status_from_state(&self.state)
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle to send commands to the coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<RecordingStatus>,
    elapsed_rx: watch::Receiver<u64>,
}

impl CoordinatorHandle {
    pub async fn start(&self) -> Result<(), RecorderError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(Command::Start { response_tx })
            .await
            .map_err(|_| RecorderError::CoordinatorUnavailable)?;

        response_rx
            .await
            .map_err(|_| RecorderError::CoordinatorUnavailable)?
    }

    pub async fn stop(&self) -> Result<Artifact, RecorderError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(Command::Stop { response_tx })
            .await
            .map_err(|_| RecorderError::CoordinatorUnavailable)?;

        response_rx
            .await
            .map_err(|_| RecorderError::CoordinatorUnavailable)?
    }

    pub async fn status(&self) -> RecordingStatus {
        let (response_tx, response_rx) = oneshot::channel();

        if self
            .command_tx
            .send(Command::Status { response_tx })
            .await
            .is_err()
        {
            return RecordingStatus::unavailable("Coordinator not running");
        }

        response_rx
            .await
            .unwrap_or_else(|_| RecordingStatus::unavailable("Coordinator not responding"))
    }

    /// State changes as they happen.
    pub fn subscribe(&self) -> watch::Receiver<RecordingStatus> {
        self.status_rx.clone()
    }

    /// Whole seconds recorded so far, updated once per second.
    pub fn elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed_rx.clone()
    }
}
