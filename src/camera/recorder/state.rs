//! Pure state machine for the recording lifecycle.
//!
//! `(State, Event) -> (NewState, Vec<SideEffect>)`
//!
//! Invalid transitions return the current state with empty effects.

use std::time::{Duration, Instant};

use crate::camera::errors::RecorderError;

/// Recording state machine.
///
/// Each variant carries only the data relevant to that state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecordingState {
    /// No recording in progress, ready to start.
    #[default]
    Idle,

    /// Start requested, waiting for the capture worker to acknowledge.
    Starting { requested_at: Instant },

    /// Frames are being captured.
    Recording {
        started_at: Instant,
        frame_count: u64,
        capture_fps: u32,
    },

    /// Capture is off, the frame sequence is being finalized.
    Stopping {
        started_at: Instant,
        stop_requested_at: Instant,
    },
}

impl RecordingState {
    /// Returns true in Starting, Recording or Stopping.
    pub fn is_active(&self) -> bool {
        !matches!(self, RecordingState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingState::Recording { .. })
    }

    /// Recording time so far. Frozen at the stop request while stopping.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            RecordingState::Recording { started_at, .. } => Some(started_at.elapsed()),
            RecordingState::Stopping {
                started_at,
                stop_requested_at,
            } => Some(stop_requested_at.saturating_duration_since(*started_at)),
            _ => None,
        }
    }

    pub fn started_at(&self) -> Option<&Instant> {
        match self {
            RecordingState::Recording { started_at, .. }
            | RecordingState::Stopping { started_at, .. } => Some(started_at),
            _ => None,
        }
    }
}

/// Events that can trigger state transitions.
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    StartRequested,

    /// The capture worker acknowledged `Start`.
    CaptureStarted,

    /// The capture worker could not be reached or did not answer in time.
    CaptureFailed { error: RecorderError },

    /// Periodic worker report.
    Progress { count: u64, fps: u32 },

    StopRequested,

    /// The worker handed over its frame sequence.
    CaptureCompleted { count: usize },

    FinalizeCompleted,

    FinalizeFailed { error: RecorderError },
}

/// Side effects triggered by state transitions.
///
/// Returned by `transition()` and executed by the coordinator.
/// The state machine itself never performs I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Send `Start` to the capture worker and arm the acknowledgement deadline.
    SignalCaptureStart,

    /// Let the display loop feed frames to the worker.
    ActivateCapture,

    StartTimer { started_at: Instant },

    DeactivateCapture,

    StopTimer,

    /// Send `Stop` to the capture worker.
    SignalCaptureStop,

    /// Hand the collected frames to the configured finalization strategy.
    Finalize { elapsed: Duration },

    /// Surface an error to whoever is waiting, and remember it for status.
    Report { error: RecorderError },

    /// Answer the pending stop request with the finished artifact.
    DeliverArtifact,

    EmitStateChange { state: RecordingState },
}

/// Pure state transition function.
///
/// Returns the new state and any side effects to execute.
/// Invalid transitions return the current state with an empty effect list.
pub fn transition(state: RecordingState, event: RecordingEvent) -> (RecordingState, Vec<SideEffect>) {
    match (&state, event) {
        // Idle + StartRequested -> Starting
        (RecordingState::Idle, RecordingEvent::StartRequested) => {
            let new_state = RecordingState::Starting {
                requested_at: Instant::now(),
            };
            let effects = vec![
                SideEffect::SignalCaptureStart,
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Starting + CaptureStarted -> Recording
        (RecordingState::Starting { .. }, RecordingEvent::CaptureStarted) => {
            let started_at = Instant::now();
            let new_state = RecordingState::Recording {
                started_at,
                frame_count: 0,
                capture_fps: 0,
            };
            let effects = vec![
                SideEffect::ActivateCapture,
                SideEffect::StartTimer { started_at },
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Starting + CaptureFailed -> Idle
        (RecordingState::Starting { .. }, RecordingEvent::CaptureFailed { error }) => {
            let new_state = RecordingState::Idle;
            let effects = vec![
                SideEffect::Report { error },
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Recording + Progress -> Recording (updated counters)
        (
            RecordingState::Recording { started_at, .. },
            RecordingEvent::Progress { count, fps },
        ) => {
            let new_state = RecordingState::Recording {
                started_at: *started_at,
                frame_count: count,
                capture_fps: fps,
            };
            let effects = vec![SideEffect::EmitStateChange {
                state: new_state.clone(),
            }];
            (new_state, effects)
        }

        // Recording + StopRequested -> Stopping
        (RecordingState::Recording { started_at, .. }, RecordingEvent::StopRequested) => {
            let new_state = RecordingState::Stopping {
                started_at: *started_at,
                stop_requested_at: Instant::now(),
            };
            let effects = vec![
                SideEffect::DeactivateCapture,
                SideEffect::StopTimer,
                SideEffect::SignalCaptureStop,
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Recording + CaptureFailed -> Idle (worker went away mid-session)
        (RecordingState::Recording { .. }, RecordingEvent::CaptureFailed { error }) => {
            let new_state = RecordingState::Idle;
            let effects = vec![
                SideEffect::DeactivateCapture,
                SideEffect::StopTimer,
                SideEffect::Report { error },
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Stopping + CaptureCompleted -> Stopping (finalizing)
        (
            RecordingState::Stopping {
                started_at,
                stop_requested_at,
            },
            RecordingEvent::CaptureCompleted { .. },
        ) => {
            let elapsed = stop_requested_at.saturating_duration_since(*started_at);
            (state, vec![SideEffect::Finalize { elapsed }])
        }

        // Stopping + CaptureFailed -> Idle
        (RecordingState::Stopping { .. }, RecordingEvent::CaptureFailed { error })
        // Stopping + FinalizeFailed -> Idle
        | (RecordingState::Stopping { .. }, RecordingEvent::FinalizeFailed { error }) => {
            let new_state = RecordingState::Idle;
            let effects = vec![
                SideEffect::Report { error },
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Stopping + FinalizeCompleted -> Idle
        (RecordingState::Stopping { .. }, RecordingEvent::FinalizeCompleted) => {
            let new_state = RecordingState::Idle;
            let effects = vec![
                SideEffect::DeliverArtifact,
                SideEffect::EmitStateChange {
                    state: new_state.clone(),
                },
            ];
            (new_state, effects)
        }

        // Invalid transition: return current state with no effects
        _ => (state, vec![]),
    }
}
