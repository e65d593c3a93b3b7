//! Display loop: keeps the canvas showing the newest camera frame.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::capture::FrameCapture;
use super::feed::{probe_dimensions, FrameSource};
use super::types::{FPS_REFRESH_INTERVAL, FPS_WINDOW};

/// Rolling FPS estimate over the last [`FPS_WINDOW`] tick intervals.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    intervals: VecDeque<Duration>,
    last_tick: Option<Instant>,
    last_refresh: Option<Instant>,
    refresh_interval: Duration,
    displayed: u32,
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new(FPS_REFRESH_INTERVAL)
    }
}

impl FpsMeter {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            intervals: VecDeque::with_capacity(FPS_WINDOW + 1),
            last_tick: None,
            last_refresh: None,
            refresh_interval,
            displayed: 0,
        }
    }

    pub fn record_tick(&mut self, now: Instant) {
        if let Some(last) = self.last_tick {
            self.intervals.push_back(now.saturating_duration_since(last));
            if self.intervals.len() > FPS_WINDOW {
                self.intervals.pop_front();
            }
        }
        self.last_tick = Some(now);
    }

    /// Estimate from the current window, `None` until two ticks were seen.
    pub fn current(&self) -> Option<u32> {
        if self.intervals.is_empty() {
            return None;
        }

        let total: Duration = self.intervals.iter().sum();
        let mean_ms = total.as_secs_f64() * 1000.0 / self.intervals.len() as f64;
        if mean_ms <= 0.0 {
            return None;
        }

        Some((1000.0 / mean_ms).round() as u32)
    }

    /// Updates the displayed value if the refresh interval has passed.
    pub fn maybe_refresh(&mut self, now: Instant) -> Option<u32> {
        let due = self
            .last_refresh
            .map_or(true, |last| now.saturating_duration_since(last) >= self.refresh_interval);
        if !due {
            return None;
        }

        let fps = self.current()?;
        self.displayed = fps;
        self.last_refresh = Some(now);
        Some(fps)
    }

    pub fn displayed(&self) -> u32 {
        self.displayed
    }
}

/// Off-screen surface holding the last successfully drawn frame.
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    frame: Option<Bytes>,
    width: u32,
    height: u32,
}

impl Canvas {
    pub fn draw(&mut self, frame: Bytes, width: u32, height: u32) {
        if self.width != width || self.height != height {
            tracing::info!(target: "viewer", "[DISPLAY] Canvas size set to {}x{}", width, height);
        }
        self.frame = Some(frame);
        self.width = width;
        self.height = height;
    }

    pub fn frame(&self) -> Option<&Bytes> {
        self.frame.as_ref()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_drawable(&self) -> bool {
        self.frame.is_some() && self.width > 0 && self.height > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayState {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub frames_drawn: u64,
}

pub struct DisplayLoop {
    source: Box<dyn FrameSource>,
    capture: FrameCapture,
    meter: FpsMeter,
    canvas: Canvas,
    tick: Duration,
    state: DisplayState,
    state_tx: watch::Sender<DisplayState>,
}

impl DisplayLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        capture: FrameCapture,
        tick: Duration,
    ) -> (Self, watch::Receiver<DisplayState>) {
        let (state_tx, state_rx) = watch::channel(DisplayState::default());

        let display = Self {
            source,
            capture,
            meter: FpsMeter::default(),
            canvas: Canvas::default(),
            tick,
            state: DisplayState::default(),
            state_tx,
        };

        (display, state_rx)
    }

    /// One tick. Returns whether a frame was drawn.
    pub async fn step(&mut self, now: Instant) -> bool {
        self.meter.record_tick(now);

        let frame = match self.source.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return false,
            Err(e) => {
                tracing::debug!(target: "viewer", "[DISPLAY] Skipping tick: {}", e);
                return false;
            }
        };

        let (width, height) = match probe_dimensions(&frame) {
            Ok(dimensions) => dimensions,
            Err(e) => {
                tracing::debug!(target: "viewer", "[DISPLAY] Skipping frame: {}", e);
                return false;
            }
        };

        self.canvas.draw(frame, width, height);
        self.state.frames_drawn += 1;
        self.state.width = width;
        self.state.height = height;

        self.capture.offer(&self.canvas, now);

        if let Some(fps) = self.meter.maybe_refresh(now) {
            self.state.fps = fps;
            self.state_tx.send_replace(self.state.clone());
        }

        true
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn spawn(mut self) -> DisplayHandle {
        let task = tokio::spawn(async move {
            tracing::info!(target: "viewer", "[DISPLAY] Starting display loop ({:?} tick)", self.tick);

            let mut interval = tokio::time::interval(self.tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                self.step(Instant::now()).await;
            }
        });

        DisplayHandle { task }
    }
}

/// Stops the display loop when dropped.
pub struct DisplayHandle {
    task: JoinHandle<()>,
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::capture::{CaptureControl, FrameEncoder};
    use crate::camera::errors::FeedError;
    use async_trait::async_trait;

    struct ScriptedSource {
        frames: VecDeque<Result<Option<Bytes>, FeedError>>,
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn next_frame(&mut self) -> Result<Option<Bytes>, FeedError> {
            self.frames.pop_front().unwrap_or(Ok(None))
        }
    }

    fn jpeg(width: u32, height: u32) -> Bytes {
        let image = image::RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3]));
        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 80)
            .encode_image(&image)
            .unwrap();
        Bytes::from(buf)
    }

    fn idle_capture() -> FrameCapture {
        let (_tx, rx) = watch::channel(CaptureControl::Idle);
        FrameCapture::new(rx, 30.0, FrameEncoder::Passthrough)
    }

    #[test]
    fn test_fps_from_window_average() {
        let mut meter = FpsMeter::default();
        let start = Instant::now();
        for i in 0..5 {
            meter.record_tick(start + Duration::from_millis(20 * i));
        }
        assert_eq!(meter.current(), Some(50));
    }

    #[test]
    fn test_window_keeps_last_twenty_intervals() {
        let mut meter = FpsMeter::default();
        let mut now = Instant::now();
        meter.record_tick(now);

        // Slow ticks first, then enough fast ones to push them out
        for _ in 0..5 {
            now += Duration::from_millis(100);
            meter.record_tick(now);
        }
        for _ in 0..FPS_WINDOW {
            now += Duration::from_millis(10);
            meter.record_tick(now);
        }

        assert_eq!(meter.current(), Some(100));
    }

    #[test]
    fn test_display_refresh_is_throttled() {
        let mut meter = FpsMeter::default();
        let start = Instant::now();
        meter.record_tick(start);
        meter.record_tick(start + Duration::from_millis(10));

        assert_eq!(meter.maybe_refresh(start), Some(100));

        meter.record_tick(start + Duration::from_millis(30));
        assert_eq!(meter.maybe_refresh(start + Duration::from_millis(499)), None);
        assert_eq!(meter.displayed(), 100);

        assert!(meter
            .maybe_refresh(start + Duration::from_millis(500))
            .is_some());
        assert_eq!(meter.displayed(), 67);
    }

    #[tokio::test]
    async fn test_bad_frames_are_skipped() {
        let source = ScriptedSource {
            frames: VecDeque::from(vec![
                Err(FeedError::NoImage),
                Ok(Some(Bytes::from_static(b"not an image"))),
                Ok(None),
                Ok(Some(jpeg(6, 4))),
            ]),
        };
        let (mut display, state) =
            DisplayLoop::new(Box::new(source), idle_capture(), Duration::from_millis(16));

        let start = Instant::now();
        let drawn: Vec<bool> = {
            let mut drawn = Vec::new();
            for i in 0..4 {
                drawn.push(display.step(start + Duration::from_millis(16 * i)).await);
            }
            drawn
        };

        assert_eq!(drawn, vec![false, false, false, true]);
        assert_eq!(display.canvas().dimensions(), (6, 4));
        assert!(display.canvas().is_drawable());
        assert_eq!(state.borrow().frames_drawn, 1);
    }
}
