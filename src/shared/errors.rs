use thiserror::Error;

/// Common storage-related errors used by logging and artifact output.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory: {0}")]
    DirectoryError(String),

    #[error("Failed to write file: {0}")]
    WriteError(#[from] std::io::Error),
}

impl StorageError {
    pub fn directory(msg: impl Into<String>) -> Self {
        StorageError::DirectoryError(msg.into())
    }
}

/// Errors that abort startup before the viewer is running.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Settings(#[from] crate::core::settings::SettingsError),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
    #[error(transparent)]
    Recorder(#[from] crate::camera::errors::RecorderError),
}
