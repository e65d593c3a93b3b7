use thiserror::Error;

/// Errors while pulling a frame from the camera feed. A failed tick is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Request(String),
    #[error("Feed returned HTTP {0}")]
    Status(u16),
    #[error("Feed response contained no complete JPEG frame")]
    NoImage,
    #[error("Frame could not be decoded: {0}")]
    Decode(String),
    #[error("Frame has zero dimensions")]
    ZeroDimensions,
}

/// Errors from the status endpoints.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatusError {
    #[error("Status request failed: {0}")]
    Network(String),
    #[error("Status endpoint returned HTTP {0}")]
    Http(u16),
    #[error("Failed to parse status response: {0}")]
    Parse(String),
}

impl StatusError {
    /// Transport-level failures count towards disabling the poller.
    pub fn is_network(&self) -> bool {
        matches!(self, StatusError::Network(_))
    }
}

/// Errors from the remote encoding pipeline (upload, encode, download, cleanup).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("Upload of batch {batch}/{total} failed: {reason}")]
    Upload {
        batch: usize,
        total: usize,
        reason: String,
    },
    #[error("Server encoding failed: {0}")]
    Rejected(String),
    #[error("Encoder request failed: {0}")]
    Request(String),
    #[error("Invalid encoder response: {0}")]
    InvalidResponse(String),
    #[error("Encoded video not ready (HTTP {0})")]
    NotReady(u16),
    #[error("Video download failed: {0}")]
    Download(String),
    #[error("Gave up waiting for encoded video after {attempts} attempts")]
    DownloadTimeout { attempts: u32 },
}

/// Errors from frame capture itself. Per-frame failures drop the frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Canvas holds no frame")]
    EmptyCanvas,
    #[error("JPEG encoding failed: {0}")]
    Encode(String),
    #[error("Capture worker is gone")]
    WorkerGone,
}

/// Top-level error type for recording operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecorderError {
    #[error("Already recording")]
    AlreadyRecording,
    #[error("No active recording to stop")]
    NotRecording,
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error(transparent)]
    EncodeFailure(#[from] EncodeError),
    #[error("No frames were captured")]
    NoFramesCaptured,
    #[error(transparent)]
    NetworkFailure(#[from] StatusError),
    #[error("Failed to save recording: {0}")]
    Storage(String),
    #[error("Recording coordinator is not running")]
    CoordinatorUnavailable,
}

impl From<CaptureError> for RecorderError {
    fn from(error: CaptureError) -> Self {
        RecorderError::CaptureUnavailable(error.to_string())
    }
}
