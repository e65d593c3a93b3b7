//! Server-side metrics, polled independently of display and recording.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::client::CameraApi;
use super::errors::StatusError;
use super::types::{StatusSnapshot, DEFAULT_TARGET_FPS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Good,
    Fair,
    Poor,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Good => write!(f, "good"),
            Health::Fair => write!(f, "fair"),
            Health::Poor => write!(f, "poor"),
        }
    }
}

pub fn fps_health(fps: f64, target: f64) -> Health {
    if target <= 0.0 {
        return Health::Poor;
    }
    let ratio = fps / target;
    if ratio < 0.5 {
        Health::Poor
    } else if ratio < 0.8 {
        Health::Fair
    } else {
        Health::Good
    }
}

pub fn latency_health(latency_ms: f64) -> Health {
    if latency_ms > 100.0 {
        Health::Poor
    } else if latency_ms > 50.0 {
        Health::Fair
    } else {
        Health::Good
    }
}

/// Display-ready view of one [`StatusSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub fps: u32,
    pub target_fps: u32,
    pub fps_health: Health,
    pub width: u32,
    pub height: u32,
    pub latency_ms: f64,
    pub latency_health: Health,
    pub recording: bool,
}

impl StatusReport {
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Self {
        let fps = snapshot.fps.max(0.0).round();
        // Zero means the server has no target configured
        let target = if snapshot.target_fps.is_finite() && snapshot.target_fps > 0.0 {
            snapshot.target_fps
        } else {
            DEFAULT_TARGET_FPS
        };

        Self {
            fps: fps as u32,
            target_fps: target.round() as u32,
            fps_health: fps_health(fps, target),
            width: snapshot.width,
            height: snapshot.height,
            latency_ms: snapshot.latency,
            latency_health: latency_health(snapshot.latency),
            recording: snapshot.recording,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FPS {}/{} ({}) | {}x{} | latency {:.1} ms ({}) | {}",
            self.fps,
            self.target_fps,
            self.fps_health,
            self.width,
            self.height,
            self.latency_ms,
            self.latency_health,
            if self.recording { "REC" } else { "idle" }
        )
    }
}

pub struct StatusPoller {
    api: Arc<dyn CameraApi>,
    interval: Duration,
    max_failures: u32,
    failures: u32,
    report_tx: watch::Sender<Option<StatusReport>>,
}

impl StatusPoller {
    pub fn new(
        api: Arc<dyn CameraApi>,
        interval: Duration,
        max_failures: u32,
    ) -> (Self, watch::Receiver<Option<StatusReport>>) {
        let (report_tx, report_rx) = watch::channel(None);

        let poller = Self {
            api,
            interval,
            max_failures: max_failures.max(1),
            failures: 0,
            report_tx,
        };

        (poller, report_rx)
    }

    /// One poll. Returns false once the poller should disable itself.
    pub async fn poll_once(&mut self) -> bool {
        match self.api.fetch_status().await {
            Ok(snapshot) => {
                self.failures = 0;

                if !snapshot.success {
                    tracing::warn!(target: "viewer", "[STATUS] Server reported failure: {}",
                        snapshot
                            .message
                            .as_deref()
                            .or(snapshot.error.as_deref())
                            .unwrap_or("no details"));
                    return true;
                }

                let report = StatusReport::from_snapshot(&snapshot);
                tracing::debug!(target: "viewer", "[STATUS] {}", report);
                self.report_tx.send_replace(Some(report));
                true
            }
            Err(e) if e.is_network() => {
                self.failures += 1;
                tracing::warn!(target: "viewer", "[STATUS] Poll failed ({}/{}): {}",
                    self.failures, self.max_failures, e);

                if self.failures >= self.max_failures {
                    tracing::warn!(target: "viewer",
                        "[STATUS] Disabling status polling after {} consecutive failures",
                        self.failures);
                    return false;
                }
                true
            }
            Err(e) => {
                tracing::warn!(target: "viewer", "[STATUS] Poll failed: {}", e);
                true
            }
        }
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if !self.poll_once().await {
                    break;
                }
            }
        })
    }
}

/// Asks the server whether the camera is already recording on its side.
pub async fn check_recording_status(api: &dyn CameraApi) -> Result<bool, StatusError> {
    let recording = api.check_recording_status().await?;
    if recording {
        tracing::info!(target: "viewer", "[STATUS] Camera is already recording server-side");
    }
    Ok(recording)
}
