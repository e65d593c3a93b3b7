//! Console commands. Thin wrappers over `CoordinatorHandle` that turn results
//! into the lines printed for the user.

use std::str::FromStr;

use thiserror::Error;

use super::coordinator::{CoordinatorHandle, RecordingStatus};
use super::finalize::Artifact;
use crate::camera::client::CameraApi;
use crate::camera::errors::RecorderError;

pub const HELP: &str = "\
Commands:
  start              start recording
  stop               stop recording and save the video
  toggle, r          start or stop
  status             show recording state
  cleanup <ts>       remove server-side temp frames of an upload
  help               show this help
  quit               stop any recording and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Toggle,
    Status,
    Cleanup(String),
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
}

impl FromStr for ConsoleCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Err(CommandParseError::Empty);
        };

        match name.to_ascii_lowercase().as_str() {
            "start" => Ok(ConsoleCommand::Start),
            "stop" => Ok(ConsoleCommand::Stop),
            "toggle" | "r" => Ok(ConsoleCommand::Toggle),
            "status" => Ok(ConsoleCommand::Status),
            "cleanup" => parts
                .next()
                .map(|ts| ConsoleCommand::Cleanup(ts.to_string()))
                .ok_or(CommandParseError::MissingArgument("cleanup")),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub enum ToggleOutcome {
    Started,
    Stopped(Artifact),
}

/// Stops when recording, otherwise starts.
pub async fn toggle_recording(handle: &CoordinatorHandle) -> Result<ToggleOutcome, RecorderError> {
    if handle.status().await.is_recording {
        handle.stop().await.map(ToggleOutcome::Stopped)
    } else {
        handle.start().await.map(|_| ToggleOutcome::Started)
    }
}

pub async fn recorder_start(handle: &CoordinatorHandle) -> Result<String, String> {
    handle
        .start()
        .await
        .map(|_| "Recording...".to_string())
        .map_err(|e| e.to_string())
}

pub async fn recorder_stop(handle: &CoordinatorHandle) -> Result<String, String> {
    handle
        .stop()
        .await
        .map(|artifact| describe_artifact(&artifact))
        .map_err(|e| e.to_string())
}

pub async fn recorder_toggle(handle: &CoordinatorHandle) -> Result<String, String> {
    match toggle_recording(handle).await {
        Ok(ToggleOutcome::Started) => Ok("Recording...".to_string()),
        Ok(ToggleOutcome::Stopped(artifact)) => Ok(describe_artifact(&artifact)),
        Err(e) => Err(e.to_string()),
    }
}

pub async fn recorder_status(handle: &CoordinatorHandle) -> Result<String, String> {
    Ok(describe_status(&handle.status().await))
}

pub async fn recorder_cleanup(api: &dyn CameraApi, timestamp: &str) -> Result<String, String> {
    api.cleanup_temp(timestamp)
        .await
        .map(|_| format!("Cleaned up temp frames for {}", timestamp))
        .map_err(|e| e.to_string())
}

pub fn describe_artifact(artifact: &Artifact) -> String {
    format!(
        "Saved {} ({} frames, {} fps, {} bytes)",
        artifact.path.display(),
        artifact.frame_count,
        artifact.fps,
        artifact.bytes
    )
}

pub fn describe_status(status: &RecordingStatus) -> String {
    let mut line = if status.is_recording {
        format!(
            "REC {} | {} frames | {} fps",
            status.elapsed_display, status.frame_count, status.capture_fps
        )
    } else if status.is_starting {
        "Starting...".to_string()
    } else if status.is_stopping {
        format!("Finishing recording ({})...", status.elapsed_display)
    } else {
        "Idle".to_string()
    };

    if let Some(error) = &status.last_error {
        line.push_str(&format!(" | last error: {}", error));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_commands() {
        assert_eq!("start".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Start));
        assert_eq!("  R ".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Toggle));
        assert_eq!(
            "cleanup 2024-05-01T10-20-30-123Z".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Cleanup("2024-05-01T10-20-30-123Z".to_string()))
        );
        assert_eq!(
            "cleanup".parse::<ConsoleCommand>(),
            Err(CommandParseError::MissingArgument("cleanup"))
        );
        assert_eq!("".parse::<ConsoleCommand>(), Err(CommandParseError::Empty));
        assert!(matches!(
            "record".parse::<ConsoleCommand>(),
            Err(CommandParseError::Unknown(_))
        ));
    }

    #[test]
    fn test_describe_status() {
        let status = RecordingStatus {
            is_recording: true,
            frame_count: 90,
            capture_fps: 30,
            elapsed_display: "00:03".to_string(),
            ..RecordingStatus::default()
        };
        assert_eq!(describe_status(&status), "REC 00:03 | 90 frames | 30 fps");

        let idle = RecordingStatus {
            last_error: Some("No frames were captured".to_string()),
            ..RecordingStatus::default()
        };
        assert_eq!(
            describe_status(&idle),
            "Idle | last error: No frames were captured"
        );
    }

    #[test]
    fn test_describe_artifact() {
        let artifact = Artifact {
            path: PathBuf::from("/tmp/video_cam_0_x.mjpeg"),
            frame_count: 3,
            fps: 1,
            bytes: 42,
            strategy: crate::camera::types::FinalizeStrategy::Local,
        };
        assert_eq!(
            describe_artifact(&artifact),
            "Saved /tmp/video_cam_0_x.mjpeg (3 frames, 1 fps, 42 bytes)"
        );
    }
}
