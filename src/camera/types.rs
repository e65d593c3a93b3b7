use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::ops::Range;
use std::time::Duration;

/// Rolling window used by the display FPS estimate.
pub const FPS_WINDOW: usize = 20;
/// Minimum time between two updates of the displayed FPS.
pub const FPS_REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// Frames the capture worker moves from its queue per batch.
pub const WORKER_BATCH_SIZE: usize = 5;
/// The worker yields to the scheduler every this many frames.
pub const WORKER_YIELD_EVERY: u64 = 10;
/// The worker reports progress every this many frames.
pub const WORKER_PROGRESS_EVERY: u64 = 30;

pub const DEFAULT_UPLOAD_BATCH_SIZE: usize = 50;

/// One encoded JPEG frame. Its position in a [`FrameSequence`] is its temporal order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub data: Bytes,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ordered, append-only frame buffer owned by one recording session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameSequence {
    frames: Vec<Frame>,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    /// Total encoded size of all frames.
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(Frame::len).sum()
    }

    /// Moves the frames out, leaving the sequence empty.
    pub fn take(&mut self) -> FrameSequence {
        std::mem::take(self)
    }
}

impl FromIterator<Frame> for FrameSequence {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

/// How a stopped recording becomes a downloadable artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FinalizeStrategy {
    /// Concatenate the JPEG frames into one `.mjpeg` file.
    #[default]
    Local,
    /// Upload frames in batches and let the server encode an `.mp4`.
    Remote,
}

impl std::fmt::Display for FinalizeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalizeStrategy::Local => write!(f, "local"),
            FinalizeStrategy::Remote => write!(f, "remote"),
        }
    }
}

/// How the display loop acquires frames from the camera feed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Re-request the feed endpoint every tick, cache-busted.
    #[default]
    Poll,
    /// Keep one multipart response open and use the newest frame each tick.
    Stream,
}

pub const DEFAULT_TARGET_FPS: f64 = 60.0;

fn default_target_fps() -> f64 {
    DEFAULT_TARGET_FPS
}

/// The server sends `null` for metrics it has not measured yet.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_target_fps<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(DEFAULT_TARGET_FPS))
}

/// Metrics reported by `GET /get_fps_{n}`. Replaced wholesale on every poll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fps: f64,
    #[serde(default = "default_target_fps", deserialize_with = "null_as_target_fps")]
    pub target_fps: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub width: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub height: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub latency: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recording: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingStatusResponse {
    #[serde(default)]
    pub recording: bool,
}

/// Body of `POST /api/encode_video`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeRequest {
    pub timestamp: String,
    pub fps: u32,
    pub frame_count: usize,
    pub filename: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Generic `{success, error?, message?}` acknowledgement.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ApiAck {
    #[serde(default = "ack_default_success")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn ack_default_success() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CleanupRequest {
    pub timestamp: String,
}

/// One slice of a frame sequence as uploaded to the encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPlan {
    /// 1-based.
    pub number: usize,
    pub total: usize,
    pub range: Range<usize>,
}

impl BatchPlan {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// A batch ready to send: the frames plus the form fields that go with them.
#[derive(Clone, Debug)]
pub struct UploadBatch<'a> {
    pub fps: u32,
    pub timestamp: &'a str,
    pub plan: &'a BatchPlan,
    pub frames: &'a [Frame],
}

impl UploadBatch<'_> {
    /// Part names keep the global frame index so the server can restore order.
    pub fn part_names(&self) -> impl Iterator<Item = String> + '_ {
        self.plan.range.clone().map(frame_part_name)
    }
}

pub fn frame_part_name(index: usize) -> String {
    format!("frame_{:06}.jpg", index)
}
