use std::path::PathBuf;

use clap::Parser;

use crate::camera::types::{FeedMode, FinalizeStrategy};
use crate::core::settings::AppSettings;

/// Command line configuration. Flags override the settings file.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Live camera viewer and recorder")]
pub struct AppArgs {
    /// Base URL of the camera server.
    #[arg(long)]
    pub server: Option<String>,
    /// Camera index (`/video_feed_{n}`).
    #[arg(long)]
    pub camera: Option<u32>,
    /// How a stopped recording becomes a video file.
    #[arg(long, value_enum)]
    pub strategy: Option<FinalizeStrategy>,
    /// Poll the feed every tick or keep one stream open.
    #[arg(long, value_enum)]
    pub feed: Option<FeedMode>,
    /// Target frames per second captured while recording.
    #[arg(long)]
    pub capture_fps: Option<f64>,
    /// Directory finished recordings are written to.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Settings file to use instead of the default location.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Record for this many seconds without the console, then exit.
    #[arg(long)]
    pub record_for: Option<u64>,
    /// Do not poll server status.
    #[arg(long, default_value_t = false)]
    pub no_status: bool,
    /// Write the merged settings back to the settings file.
    #[arg(long, default_value_t = false)]
    pub save_settings: bool,
    /// Also log to stderr.
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl AppArgs {
    /// Overlays the flags that were given onto `settings`.
    pub fn apply(&self, settings: &mut AppSettings) {
        if let Some(server) = &self.server {
            settings.server_url = server.clone();
        }
        if let Some(camera) = self.camera {
            settings.camera = camera;
        }
        if let Some(strategy) = self.strategy {
            settings.strategy = strategy;
        }
        if let Some(feed) = self.feed {
            settings.feed_mode = feed;
        }
        if let Some(fps) = self.capture_fps {
            settings.capture_fps = fps;
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = Some(dir.clone());
        }
    }
}
