//! In-process stand-in for the camera server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use camrec_lib::camera::client::CameraApi;
use camrec_lib::camera::errors::{EncodeError, FeedError, StatusError};
use camrec_lib::camera::types::{EncodeRequest, StatusSnapshot, UploadBatch};

/// One recorded `upload_frames` call.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadCall {
    pub number: usize,
    pub total: usize,
    pub fps: u32,
    pub timestamp: String,
    pub part_names: Vec<String>,
    pub frames: Vec<Bytes>,
}

#[derive(Default)]
pub struct FakeCameraApi {
    pub uploads: Mutex<Vec<UploadCall>>,
    pub encodes: Mutex<Vec<EncodeRequest>>,
    pub downloads: Mutex<Vec<String>>,
    pub cleanups: Mutex<Vec<String>>,
    /// Batch number whose upload is answered with an error.
    pub fail_upload_at: Option<usize>,
    /// Download answers consumed in order, then the video is returned.
    pub download_script: Mutex<VecDeque<Result<Bytes, EncodeError>>>,
    pub video: Bytes,
}

impl FakeCameraApi {
    pub fn new() -> Self {
        Self {
            video: Bytes::from_static(b"\x00\x00\x00\x18ftypmp42"),
            ..Self::default()
        }
    }

    pub fn failing_upload_at(batch: usize) -> Self {
        Self {
            fail_upload_at: Some(batch),
            ..Self::new()
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl CameraApi for FakeCameraApi {
    async fn fetch_frame(&self) -> Result<Bytes, FeedError> {
        Err(FeedError::NoImage)
    }

    async fn fetch_status(&self) -> Result<StatusSnapshot, StatusError> {
        Err(StatusError::Network("offline".to_string()))
    }

    async fn check_recording_status(&self) -> Result<bool, StatusError> {
        Ok(false)
    }

    async fn upload_frames(&self, batch: UploadBatch<'_>) -> Result<(), EncodeError> {
        self.uploads.lock().unwrap().push(UploadCall {
            number: batch.plan.number,
            total: batch.plan.total,
            fps: batch.fps,
            timestamp: batch.timestamp.to_string(),
            part_names: batch.part_names().collect(),
            frames: batch.frames.iter().map(|f| f.data.clone()).collect(),
        });

        if self.fail_upload_at == Some(batch.plan.number) {
            return Err(EncodeError::Upload {
                batch: batch.plan.number,
                total: batch.plan.total,
                reason: "HTTP 500".to_string(),
            });
        }
        Ok(())
    }

    async fn encode_video(&self, request: &EncodeRequest) -> Result<(), EncodeError> {
        self.encodes.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn download_video(&self, filename: &str) -> Result<Bytes, EncodeError> {
        self.downloads.lock().unwrap().push(filename.to_string());
        match self.download_script.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => Ok(self.video.clone()),
        }
    }

    async fn cleanup_temp(&self, timestamp: &str) -> Result<(), EncodeError> {
        self.cleanups.lock().unwrap().push(timestamp.to_string());
        Ok(())
    }
}

/// Minimal JPEG-shaped buffer tagged with `i`.
pub fn tagged_frame(i: u8) -> Bytes {
    Bytes::from(vec![0xFF, 0xD8, i, 0xFF, 0xD9])
}
