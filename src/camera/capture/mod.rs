//! Frame capture pipeline.
//!
//! The display loop offers every drawn canvas to [`FrameCapture`]. While the
//! coordinator has capture switched on, frames that pass the rate gate are
//! encoded and handed to the capture worker without waiting for it.

pub mod worker;

use std::io::Cursor;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::display::Canvas;
use super::errors::CaptureError;
use worker::WorkerMessage;

/// Switched by the coordinator, read by the display loop on every tick.
#[derive(Debug, Clone, Default)]
pub enum CaptureControl {
    #[default]
    Idle,
    Active {
        session: Uuid,
        sink: mpsc::UnboundedSender<WorkerMessage>,
    },
}

impl CaptureControl {
    pub fn is_active(&self) -> bool {
        matches!(self, CaptureControl::Active { .. })
    }
}

/// Rate limiter for sampling the canvas.
#[derive(Debug, Clone)]
pub struct FrameGate {
    interval: Duration,
    last_capture: Option<Instant>,
}

impl FrameGate {
    pub fn new(capture_fps: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / capture_fps.max(1.0)),
            last_capture: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn reset(&mut self, now: Instant) {
        self.last_capture = Some(now);
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_capture {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Only call after a frame was actually captured.
    pub fn mark(&mut self, now: Instant) {
        self.last_capture = Some(now);
    }
}

/// How canvas contents become a JPEG frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameEncoder {
    /// Feed bytes are already JPEG, keep them as they are.
    #[default]
    Passthrough,
    Reencode { quality: u8 },
}

impl FrameEncoder {
    pub fn from_quality(quality: Option<u8>) -> Self {
        match quality {
            Some(quality) => FrameEncoder::Reencode {
                quality: quality.clamp(1, 100),
            },
            None => FrameEncoder::Passthrough,
        }
    }

    pub fn encode(&self, data: &Bytes) -> Result<Bytes, CaptureError> {
        match self {
            FrameEncoder::Passthrough => Ok(data.clone()),
            FrameEncoder::Reencode { quality } => {
                let decoded = image::ImageReader::new(Cursor::new(data.as_ref()))
                    .with_guessed_format()
                    .map_err(|e| CaptureError::Encode(e.to_string()))?
                    .decode()
                    .map_err(|e| CaptureError::Encode(e.to_string()))?;

                // JPEG has no alpha channel
                let rgb = decoded.to_rgb8();

                let mut buf = Vec::new();
                JpegEncoder::new_with_quality(&mut buf, *quality)
                    .encode_image(&rgb)
                    .map_err(|e| CaptureError::Encode(e.to_string()))?;

                Ok(Bytes::from(buf))
            }
        }
    }
}

/// Result of offering one drawn canvas to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Inactive,
    NotDue,
    Captured,
    Dropped(CaptureError),
}

pub struct FrameCapture {
    control: watch::Receiver<CaptureControl>,
    gate: FrameGate,
    encoder: FrameEncoder,
    session: Option<Uuid>,
    captured: u64,
}

impl FrameCapture {
    pub fn new(
        control: watch::Receiver<CaptureControl>,
        capture_fps: f64,
        encoder: FrameEncoder,
    ) -> Self {
        Self {
            control,
            gate: FrameGate::new(capture_fps),
            encoder,
            session: None,
            captured: 0,
        }
    }

    /// Frames captured in the current session.
    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn offer(&mut self, canvas: &Canvas, now: Instant) -> CaptureOutcome {
        let (session, sink) = match &*self.control.borrow() {
            CaptureControl::Active { session, sink } => (*session, sink.clone()),
            CaptureControl::Idle => {
                self.session = None;
                return CaptureOutcome::Inactive;
            }
        };

        if self.session != Some(session) {
            tracing::debug!(target: "recorder", "[CAPTURE] Session {} active", session);
            self.session = Some(session);
            self.captured = 0;
            self.gate.reset(now);
            return CaptureOutcome::NotDue;
        }

        if !self.gate.is_due(now) {
            return CaptureOutcome::NotDue;
        }

        let Some(frame) = canvas.frame() else {
            return CaptureOutcome::Dropped(CaptureError::EmptyCanvas);
        };

        let encoded = match self.encoder.encode(frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(target: "recorder", "[CAPTURE] Dropping frame: {}", e);
                return CaptureOutcome::Dropped(e);
            }
        };

        if sink.send(WorkerMessage::Frame(encoded)).is_err() {
            tracing::warn!(target: "recorder", "[CAPTURE] Worker channel closed, frame dropped");
            return CaptureOutcome::Dropped(CaptureError::WorkerGone);
        }

        self.gate.mark(now);
        self.captured += 1;
        CaptureOutcome::Captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_jpeg() -> Bytes {
        let image = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 100, 50]));
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 90)
            .encode_image(&image)
            .unwrap();
        Bytes::from(buf)
    }

    fn drawn_canvas() -> Canvas {
        let mut canvas = Canvas::default();
        canvas.draw(sample_jpeg(), 4, 4);
        canvas
    }

    #[test]
    fn test_gate_waits_one_interval() {
        let mut gate = FrameGate::new(10.0);
        let start = Instant::now();
        gate.reset(start);

        assert!(!gate.is_due(start + Duration::from_millis(99)));
        assert!(gate.is_due(start + Duration::from_millis(100)));
    }

    #[test]
    fn test_gate_without_capture_is_due() {
        assert!(FrameGate::new(60.0).is_due(Instant::now()));
    }

    #[test]
    fn test_reencode_produces_jpeg() {
        let encoded = FrameEncoder::Reencode { quality: 50 }
            .encode(&sample_jpeg())
            .unwrap();
        assert_eq!(&encoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_reencode_rejects_garbage() {
        let result = FrameEncoder::from_quality(Some(80)).encode(&Bytes::from_static(b"nope"));
        assert!(matches!(result, Err(CaptureError::Encode(_))));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(
            FrameEncoder::from_quality(Some(0)),
            FrameEncoder::Reencode { quality: 1 }
        );
        assert_eq!(FrameEncoder::from_quality(None), FrameEncoder::Passthrough);
    }

    #[test]
    fn test_idle_control_captures_nothing() {
        let (_tx, rx) = watch::channel(CaptureControl::Idle);
        let mut capture = FrameCapture::new(rx, 30.0, FrameEncoder::Passthrough);

        assert_eq!(
            capture.offer(&drawn_canvas(), Instant::now()),
            CaptureOutcome::Inactive
        );
    }

    #[test]
    fn test_active_session_captures_at_rate() {
        let (sink, mut frames) = mpsc::unbounded_channel();
        let (_tx, rx) = watch::channel(CaptureControl::Active {
            session: Uuid::new_v4(),
            sink,
        });
        let mut capture = FrameCapture::new(rx, 10.0, FrameEncoder::Passthrough);
        let canvas = drawn_canvas();
        let start = Instant::now();

        // First observation only arms the gate
        assert_eq!(capture.offer(&canvas, start), CaptureOutcome::NotDue);
        assert_eq!(
            capture.offer(&canvas, start + Duration::from_millis(50)),
            CaptureOutcome::NotDue
        );
        assert_eq!(
            capture.offer(&canvas, start + Duration::from_millis(100)),
            CaptureOutcome::Captured
        );
        assert_eq!(
            capture.offer(&canvas, start + Duration::from_millis(150)),
            CaptureOutcome::NotDue
        );
        assert_eq!(
            capture.offer(&canvas, start + Duration::from_millis(200)),
            CaptureOutcome::Captured
        );

        assert_eq!(capture.captured(), 2);
        assert!(matches!(frames.try_recv(), Ok(WorkerMessage::Frame(_))));
        assert!(matches!(frames.try_recv(), Ok(WorkerMessage::Frame(_))));
        assert!(frames.try_recv().is_err());
    }

    #[test]
    fn test_empty_canvas_does_not_advance_gate() {
        let (sink, _frames) = mpsc::unbounded_channel();
        let (_tx, rx) = watch::channel(CaptureControl::Active {
            session: Uuid::new_v4(),
            sink,
        });
        let mut capture = FrameCapture::new(rx, 10.0, FrameEncoder::Passthrough);
        let start = Instant::now();
        capture.offer(&Canvas::default(), start);

        let due = start + Duration::from_millis(100);
        assert_eq!(
            capture.offer(&Canvas::default(), due),
            CaptureOutcome::Dropped(CaptureError::EmptyCanvas)
        );
        assert_eq!(
            capture.offer(&drawn_canvas(), due + Duration::from_millis(1)),
            CaptureOutcome::Captured
        );
    }
}
