pub mod commands;
pub mod coordinator;
pub mod finalize;
pub mod state;
pub mod timer;

pub use coordinator::{CoordinatorHandle, RecorderConfig, RecordingCoordinator, RecordingStatus};
pub use finalize::Artifact;
