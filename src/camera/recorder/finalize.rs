//! Turns a stopped recording into a file on disk.
//!
//! `Local` concatenates the JPEG frames into an MJPEG file. `Remote` uploads
//! the frames in batches, has the server encode an MP4 and downloads it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::camera::client::CameraApi;
use crate::camera::errors::{EncodeError, RecorderError};
use crate::camera::types::{BatchPlan, EncodeRequest, FinalizeStrategy, FrameSequence, UploadBatch};
use crate::shared::errors::StorageError;

/// Pause between two batch uploads.
const UPLOAD_PAUSE: Duration = Duration::from_millis(10);
const DOWNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DOWNLOAD_MAX_ATTEMPTS: u32 = 20;

/// A finished recording written to the output directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub path: PathBuf,
    pub frame_count: usize,
    pub fps: u32,
    pub bytes: u64,
    pub strategy: FinalizeStrategy,
}

#[derive(Debug, Clone)]
pub struct FinalizeContext {
    pub camera: u32,
    /// Time between recording start and stop request.
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
    pub output_dir: PathBuf,
    pub batch_size: usize,
}

impl FinalizeContext {
    pub fn timestamp(&self) -> String {
        artifact_timestamp(self.finished_at)
    }
}

/// ISO-8601 with milliseconds, `:` and `.` replaced so it is filename-safe.
pub fn artifact_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

pub fn local_filename(camera: u32, timestamp: &str) -> String {
    format!("video_cam_{}_{}.mjpeg", camera, timestamp)
}

pub fn remote_filename(camera: u32, timestamp: &str) -> String {
    format!("video_cam_{}_{}_HW.mp4", camera, timestamp)
}

/// Effective frame rate of a recording, never below 1.
pub fn recording_fps(frame_count: usize, elapsed: Duration) -> u32 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 1;
    }
    ((frame_count as f64 / secs).round() as u32).max(1)
}

/// Splits `frame_count` frames into consecutive upload batches.
pub fn plan_batches(frame_count: usize, batch_size: usize) -> Vec<BatchPlan> {
    let batch_size = batch_size.max(1);
    let total = frame_count.div_ceil(batch_size);

    (0..total)
        .map(|i| {
            let start = i * batch_size;
            BatchPlan {
                number: i + 1,
                total,
                range: start..(start + batch_size).min(frame_count),
            }
        })
        .collect()
}

async fn write_artifact(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StorageError::directory(format!("{}: {}", dir.display(), e)))?;

    let path = dir.join(filename);
    tokio::fs::write(&path, data).await?;
    Ok(path)
}

pub async fn bundle_locally(
    frames: &FrameSequence,
    ctx: &FinalizeContext,
) -> Result<Artifact, RecorderError> {
    if frames.is_empty() {
        return Err(RecorderError::NoFramesCaptured);
    }

    let mut data = Vec::with_capacity(frames.byte_len());
    for frame in frames.iter() {
        data.extend_from_slice(&frame.data);
    }

    let filename = local_filename(ctx.camera, &ctx.timestamp());
    let path = write_artifact(&ctx.output_dir, &filename, &data)
        .await
        .map_err(|e| RecorderError::Storage(e.to_string()))?;

    tracing::info!(target: "recorder", "[FINALIZE] Bundled {} frames into {:?}",
        frames.len(), path);

    Ok(Artifact {
        path,
        frame_count: frames.len(),
        fps: recording_fps(frames.len(), ctx.elapsed),
        bytes: data.len() as u64,
        strategy: FinalizeStrategy::Local,
    })
}

pub async fn encode_remotely(
    api: &dyn CameraApi,
    frames: &FrameSequence,
    ctx: &FinalizeContext,
) -> Result<Artifact, RecorderError> {
    if frames.is_empty() {
        return Err(RecorderError::NoFramesCaptured);
    }

    let timestamp = ctx.timestamp();
    let fps = recording_fps(frames.len(), ctx.elapsed);
    let batches = plan_batches(frames.len(), ctx.batch_size);

    tracing::info!(target: "recorder",
        "[FINALIZE] Uploading {} frames in {} batches at {} fps",
        frames.len(), batches.len(), fps);

    for plan in &batches {
        let batch = UploadBatch {
            fps,
            timestamp: &timestamp,
            plan,
            frames: &frames.frames()[plan.range.clone()],
        };
        api.upload_frames(batch).await?;
        tracing::debug!(target: "recorder", "[FINALIZE] Uploaded batch {}/{}",
            plan.number, plan.total);

        if plan.number < plan.total {
            tokio::time::sleep(UPLOAD_PAUSE).await;
        }
    }

    let filename = remote_filename(ctx.camera, &timestamp);
    let request = EncodeRequest {
        timestamp: timestamp.clone(),
        fps,
        frame_count: frames.len(),
        filename: filename.clone(),
    };
    api.encode_video(&request).await?;
    tracing::info!(target: "recorder", "[FINALIZE] Server encoded {}", filename);

    let video = download_when_ready(api, &filename).await?;

    let path = write_artifact(&ctx.output_dir, &filename, &video)
        .await
        .map_err(|e| RecorderError::Storage(e.to_string()))?;

    if let Err(e) = api.cleanup_temp(&timestamp).await {
        tracing::warn!(target: "recorder",
            "[FINALIZE] Cleanup of {} failed, run `cleanup {}` later: {}",
            timestamp, timestamp, e);
    }

    tracing::info!(target: "recorder", "[FINALIZE] Saved {:?} ({} bytes)", path, video.len());

    Ok(Artifact {
        path,
        frame_count: frames.len(),
        fps,
        bytes: video.len() as u64,
        strategy: FinalizeStrategy::Remote,
    })
}

async fn download_when_ready(
    api: &dyn CameraApi,
    filename: &str,
) -> Result<bytes::Bytes, EncodeError> {
    for attempt in 1..=DOWNLOAD_MAX_ATTEMPTS {
        match api.download_video(filename).await {
            Ok(video) if !video.is_empty() => return Ok(video),
            Ok(_) | Err(EncodeError::NotReady(_)) => {
                tracing::debug!(target: "recorder",
                    "[FINALIZE] {} not ready (attempt {}/{})",
                    filename, attempt, DOWNLOAD_MAX_ATTEMPTS);
            }
            Err(e) => return Err(e),
        }

        if attempt < DOWNLOAD_MAX_ATTEMPTS {
            tokio::time::sleep(DOWNLOAD_POLL_INTERVAL).await;
        }
    }

    Err(EncodeError::DownloadTimeout {
        attempts: DOWNLOAD_MAX_ATTEMPTS,
    })
}

pub async fn finalize(
    strategy: FinalizeStrategy,
    api: &dyn CameraApi,
    frames: &FrameSequence,
    ctx: &FinalizeContext,
) -> Result<Artifact, RecorderError> {
    match strategy {
        FinalizeStrategy::Local => bundle_locally(frames, ctx).await,
        FinalizeStrategy::Remote => encode_remotely(api, frames, ctx).await,
    }
}
