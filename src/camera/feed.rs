//! Frame acquisition from the camera feed endpoint.
//!
//! The feed may answer with a single JPEG or with an endless
//! `multipart/x-mixed-replace` MJPEG stream, so frames are cut out of the
//! body by their SOI/EOI markers instead of trusting the response framing.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::client::CameraApi;
use super::errors::FeedError;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Pending bytes without a complete frame beyond this are discarded.
pub const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

const STREAM_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Incremental JPEG splitter for MJPEG bodies.
#[derive(Debug)]
pub struct JpegExtractor {
    buffer: Vec<u8>,
    max_pending: usize,
}

impl Default for JpegExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegExtractor {
    pub fn new() -> Self {
        Self::with_limit(MAX_PENDING_BYTES)
    }

    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_pending,
        }
    }

    /// Feeds a chunk and returns every frame it completed, oldest first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }

        if self.buffer.len() > self.max_pending {
            tracing::warn!(target: "viewer",
                "[FEED] {} bytes pending without a frame end, discarding",
                self.buffer.len());
            self.buffer.clear();
        }

        frames
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn next_frame(&mut self) -> Option<Bytes> {
        let Some(start) = find_marker(&self.buffer, SOI, 0) else {
            // A marker may straddle two chunks
            let keep_last = self.buffer.last() == Some(&0xFF);
            self.buffer.clear();
            if keep_last {
                self.buffer.push(0xFF);
            }
            return None;
        };

        if start > 0 {
            self.buffer.drain(..start);
        }

        let end = find_marker(&self.buffer, EOI, SOI.len())?;
        let frame: Vec<u8> = self.buffer.drain(..end + EOI.len()).collect();
        Some(Bytes::from(frame))
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + marker.len() {
        return None;
    }
    haystack[from..]
        .windows(marker.len())
        .position(|window| window == marker)
        .map(|pos| pos + from)
}

/// Reads a response until its first complete JPEG, then drops the connection.
pub async fn read_first_jpeg(mut response: reqwest::Response) -> Result<Bytes, FeedError> {
    let mut extractor = JpegExtractor::new();

    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if let Some(frame) = extractor.push(&chunk).into_iter().next() {
                    return Ok(frame);
                }
            }
            Ok(None) => return Err(FeedError::NoImage),
            Err(e) => return Err(FeedError::Request(e.to_string())),
        }
    }
}

/// Reads width and height from the image header without decoding pixels.
pub fn probe_dimensions(data: &[u8]) -> Result<(u32, u32), FeedError> {
    let (width, height) = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| FeedError::Decode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| FeedError::Decode(e.to_string()))?;

    if width == 0 || height == 0 {
        return Err(FeedError::ZeroDimensions);
    }

    Ok((width, height))
}

/// Where the display loop gets its frames from.
///
/// `Ok(None)` means nothing new arrived this tick, which is not an error.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Option<Bytes>, FeedError>;
}

/// Re-requests the feed endpoint on every tick.
pub struct PollingSource {
    api: Arc<dyn CameraApi>,
}

impl PollingSource {
    pub fn new(api: Arc<dyn CameraApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl FrameSource for PollingSource {
    async fn next_frame(&mut self) -> Result<Option<Bytes>, FeedError> {
        self.api.fetch_frame().await.map(Some)
    }
}

/// Keeps one feed response open and exposes the newest frame.
pub struct StreamSource {
    latest: watch::Receiver<Option<Bytes>>,
    reader: JoinHandle<()>,
}

impl StreamSource {
    pub fn connect(client: reqwest::Client, url: String) -> Self {
        let (tx, latest) = watch::channel(None);
        let reader = tokio::spawn(read_stream(client, url, tx));
        Self { latest, reader }
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl FrameSource for StreamSource {
    async fn next_frame(&mut self) -> Result<Option<Bytes>, FeedError> {
        let changed = self
            .latest
            .has_changed()
            .map_err(|_| FeedError::Request("stream reader stopped".to_string()))?;

        if !changed {
            return Ok(None);
        }

        Ok(self.latest.borrow_and_update().clone())
    }
}

async fn read_stream(client: reqwest::Client, url: String, tx: watch::Sender<Option<Bytes>>) {
    loop {
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(target: "viewer", "[FEED] Stream connected: {}", url);
                let mut response = response;
                let mut extractor = JpegExtractor::new();

                loop {
                    match response.chunk().await {
                        Ok(Some(chunk)) => {
                            for frame in extractor.push(&chunk) {
                                if tx.send(Some(frame)).is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(None) => {
                            tracing::info!(target: "viewer", "[FEED] Stream ended");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(target: "viewer", "[FEED] Stream read failed: {}", e);
                            break;
                        }
                    }
                }
            }
            Ok(response) => {
                tracing::warn!(target: "viewer", "[FEED] Stream returned HTTP {}", response.status());
            }
            Err(e) => {
                tracing::warn!(target: "viewer", "[FEED] Stream connect failed: {}", e);
            }
        }

        if tx.is_closed() {
            return;
        }

        tokio::time::sleep(STREAM_RECONNECT_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_like(payload: &[u8]) -> Vec<u8> {
        let mut frame = SOI.to_vec();
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&EOI);
        frame
    }

    #[test]
    fn test_single_image_body() {
        let mut extractor = JpegExtractor::new();
        let frames = extractor.push(&jpeg_like(b"abc"));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), jpeg_like(b"abc").as_slice());
        assert_eq!(extractor.pending(), 0);
    }

    #[test]
    fn test_multipart_body_with_boundaries() {
        let mut body = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        body.extend(jpeg_like(b"one"));
        body.extend_from_slice(b"\r\n--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        body.extend(jpeg_like(b"two"));
        body.extend_from_slice(b"\r\n");

        let mut extractor = JpegExtractor::new();
        let frames = extractor.push(&body);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), jpeg_like(b"one").as_slice());
        assert_eq!(frames[1].as_ref(), jpeg_like(b"two").as_slice());
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let frame = jpeg_like(b"split-payload");
        let mut extractor = JpegExtractor::new();

        // Split inside the SOI marker and again inside the EOI marker
        assert!(extractor.push(&frame[..1]).is_empty());
        assert!(extractor.push(&frame[1..frame.len() - 1]).is_empty());
        let frames = extractor.push(&frame[frame.len() - 1..]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), frame.as_slice());
    }

    #[test]
    fn test_garbage_without_marker_is_dropped() {
        let mut extractor = JpegExtractor::new();
        assert!(extractor.push(b"no markers here").is_empty());
        assert_eq!(extractor.pending(), 0);
    }

    #[test]
    fn test_oversized_pending_is_discarded() {
        let mut extractor = JpegExtractor::with_limit(8);
        let mut partial = SOI.to_vec();
        partial.extend_from_slice(&[0u8; 16]);

        assert!(extractor.push(&partial).is_empty());
        assert_eq!(extractor.pending(), 0);
    }

    #[test]
    fn test_probe_dimensions_of_real_jpeg() {
        let image = image::RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]));
        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 80)
            .encode_image(&image)
            .unwrap();

        assert_eq!(probe_dimensions(&buf).unwrap(), (8, 6));
    }

    #[test]
    fn test_probe_dimensions_rejects_garbage() {
        assert!(matches!(
            probe_dimensions(&jpeg_like(b"junk")),
            Err(FeedError::Decode(_))
        ));
    }
}
