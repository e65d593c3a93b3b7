//! HTTP contract with the camera server.
//!
//! Everything the recorder needs from the server goes through [`CameraApi`],
//! so the pipeline can be driven against an in-process fake.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use super::errors::{EncodeError, FeedError, StatusError};
use super::feed::{read_first_jpeg, StreamSource};
use super::types::{
    ApiAck, CleanupRequest, EncodeRequest, EncodeResponse, RecordingStatusResponse, StatusSnapshot,
    UploadBatch,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait CameraApi: Send + Sync {
    /// Latest frame from the feed endpoint.
    async fn fetch_frame(&self) -> Result<Bytes, FeedError>;

    async fn fetch_status(&self) -> Result<StatusSnapshot, StatusError>;

    async fn check_recording_status(&self) -> Result<bool, StatusError>;

    async fn upload_frames(&self, batch: UploadBatch<'_>) -> Result<(), EncodeError>;

    async fn encode_video(&self, request: &EncodeRequest) -> Result<(), EncodeError>;

    /// `EncodeError::NotReady` means the server has not produced the file yet.
    async fn download_video(&self, filename: &str) -> Result<Bytes, EncodeError>;

    async fn cleanup_temp(&self, timestamp: &str) -> Result<(), EncodeError>;
}

pub struct HttpCameraClient {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    base_url: String,
    camera: u32,
}

impl HttpCameraClient {
    pub fn new(base_url: &str, camera: u32, timeout: Duration) -> Result<Self, reqwest::Error> {
        // The camera server is reached directly, never through a proxy
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .no_proxy()
            .build()?;

        // No total timeout: the stream response stays open indefinitely
        let stream_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            stream_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            camera,
        })
    }

    pub fn camera(&self) -> u32 {
        self.camera
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn feed_url(&self) -> String {
        self.url(&format!("/video_feed_{}", self.camera))
    }

    /// Push-based alternative to polling [`CameraApi::fetch_frame`].
    pub fn open_stream(&self) -> StreamSource {
        StreamSource::connect(self.stream_client.clone(), self.feed_url())
    }
}

/// Interprets an optional `{success, error}` body on an otherwise 2xx response.
async fn check_ack(response: reqwest::Response) -> Result<(), String> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(format!("HTTP {}: {}", status, body.trim()));
    }

    match serde_json::from_str::<ApiAck>(&body) {
        Ok(ack) if !ack.success => Err(ack
            .error
            .or(ack.message)
            .unwrap_or_else(|| "server reported failure".to_string())),
        _ => Ok(()),
    }
}

#[async_trait]
impl CameraApi for HttpCameraClient {
    async fn fetch_frame(&self) -> Result<Bytes, FeedError> {
        let cache_buster = chrono::Utc::now().timestamp_millis();

        let response = self
            .client
            .get(format!("{}?t={}", self.feed_url(), cache_buster))
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FeedError::Status(response.status().as_u16()));
        }

        read_first_jpeg(response).await
    }

    async fn fetch_status(&self) -> Result<StatusSnapshot, StatusError> {
        let response = self
            .client
            .get(self.url(&format!("/get_fps_{}", self.camera)))
            .send()
            .await
            .map_err(|e| StatusError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StatusError::Http(response.status().as_u16()));
        }

        response
            .json::<StatusSnapshot>()
            .await
            .map_err(|e| StatusError::Parse(e.to_string()))
    }

    async fn check_recording_status(&self) -> Result<bool, StatusError> {
        let response = self
            .client
            .get(self.url(&format!("/check_recording_status_{}", self.camera)))
            .send()
            .await
            .map_err(|e| StatusError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StatusError::Http(response.status().as_u16()));
        }

        let status = response
            .json::<RecordingStatusResponse>()
            .await
            .map_err(|e| StatusError::Parse(e.to_string()))?;

        Ok(status.recording)
    }

    async fn upload_frames(&self, batch: UploadBatch<'_>) -> Result<(), EncodeError> {
        let upload_error = |reason: String| EncodeError::Upload {
            batch: batch.plan.number,
            total: batch.plan.total,
            reason,
        };

        let mut form = Form::new()
            .text("fps", batch.fps.to_string())
            .text("timestamp", batch.timestamp.to_string())
            .text("batchNumber", batch.plan.number.to_string())
            .text("totalBatches", batch.plan.total.to_string());

        for (frame, name) in batch.frames.iter().zip(batch.part_names()) {
            let part = Part::stream(frame.data.clone())
                .file_name(name)
                .mime_str("image/jpeg")
                .map_err(|e| upload_error(e.to_string()))?;
            form = form.part("frames", part);
        }

        let response = self
            .client
            .post(self.url("/api/upload_frames"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        check_ack(response).await.map_err(upload_error)
    }

    async fn encode_video(&self, request: &EncodeRequest) -> Result<(), EncodeError> {
        let response = self
            .client
            .post(self.url("/api/encode_video"))
            .json(request)
            .send()
            .await
            .map_err(|e| EncodeError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EncodeError::Rejected(body.trim().to_string()));
        }

        let result = response
            .json::<EncodeResponse>()
            .await
            .map_err(|e| EncodeError::InvalidResponse(e.to_string()))?;

        if !result.success {
            return Err(EncodeError::Rejected(
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(())
    }

    async fn download_video(&self, filename: &str) -> Result<Bytes, EncodeError> {
        let response = self
            .client
            .get(self.url(&format!("/api/download_video/{}", filename)))
            .send()
            .await
            .map_err(|e| EncodeError::Download(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| EncodeError::Download(e.to_string())),
            // Missing or still-empty file on the server
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                Err(EncodeError::NotReady(response.status().as_u16()))
            }
            status => Err(EncodeError::Download(format!("HTTP {}", status))),
        }
    }

    async fn cleanup_temp(&self, timestamp: &str) -> Result<(), EncodeError> {
        let response = self
            .client
            .post(self.url("/api/cleanup_temp"))
            .json(&CleanupRequest {
                timestamp: timestamp.to_string(),
            })
            .send()
            .await
            .map_err(|e| EncodeError::Request(e.to_string()))?;

        check_ack(response).await.map_err(EncodeError::Request)
    }
}
