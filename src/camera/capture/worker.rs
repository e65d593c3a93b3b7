//! Background capture worker.
//!
//! Owns the frame sequence of the running session. Frames arrive
//! fire-and-forget from the display loop and are moved from a queue into the
//! sequence in small batches so the task never hogs a runtime thread.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::camera::types::{
    Frame, FrameSequence, WORKER_BATCH_SIZE, WORKER_PROGRESS_EVERY, WORKER_YIELD_EVERY,
};

#[derive(Debug)]
pub enum WorkerMessage {
    Start,
    Frame(Bytes),
    Stop,
}

#[derive(Debug)]
pub enum WorkerResponse {
    Started,
    Progress { count: u64, fps: u32 },
    Complete { frames: FrameSequence, count: usize },
}

/// Spawns the worker task. It exits once the message sender is dropped.
pub fn spawn_capture_worker() -> (
    mpsc::UnboundedSender<WorkerMessage>,
    mpsc::Receiver<WorkerResponse>,
    JoinHandle<()>,
) {
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::channel(64);

    let worker = CaptureWorker::new(response_tx);
    let handle = tokio::spawn(worker.run(message_rx));

    (message_tx, response_rx, handle)
}

struct CaptureWorker {
    recording: bool,
    queue: VecDeque<Bytes>,
    frames: FrameSequence,
    processed: u64,
    last_progress: Instant,
    responses: mpsc::Sender<WorkerResponse>,
}

impl CaptureWorker {
    fn new(responses: mpsc::Sender<WorkerResponse>) -> Self {
        Self {
            recording: false,
            queue: VecDeque::new(),
            frames: FrameSequence::new(),
            processed: 0,
            last_progress: Instant::now(),
            responses,
        }
    }

    async fn run(mut self, mut messages: mpsc::UnboundedReceiver<WorkerMessage>) {
        tracing::debug!(target: "recorder", "[WORKER] Started");

        loop {
            if self.queue.is_empty() {
                let Some(message) = messages.recv().await else {
                    break;
                };
                if !self.handle(message).await {
                    break;
                }
                continue;
            }

            // Keep accepting messages while the backlog is worked off
            while let Ok(message) = messages.try_recv() {
                if !self.handle(message).await {
                    return;
                }
            }

            if !self.process_batch().await {
                break;
            }
        }

        tracing::debug!(target: "recorder", "[WORKER] Exiting");
    }

    /// Returns false once nobody listens for responses anymore.
    async fn handle(&mut self, message: WorkerMessage) -> bool {
        match message {
            WorkerMessage::Start => {
                self.recording = true;
                self.queue.clear();
                self.frames.clear();
                self.processed = 0;
                self.last_progress = Instant::now();
                tracing::info!(target: "recorder", "[WORKER] Recording started");
                self.respond(WorkerResponse::Started).await
            }
            WorkerMessage::Frame(data) => {
                if self.recording {
                    self.queue.push_back(data);
                }
                true
            }
            WorkerMessage::Stop => {
                while !self.queue.is_empty() {
                    if !self.process_batch().await {
                        return false;
                    }
                }

                self.recording = false;
                let frames = self.frames.take();
                let count = frames.len();
                tracing::info!(target: "recorder",
                    "[WORKER] Recording stopped with {} frames ({} bytes)",
                    count, frames.byte_len());

                self.respond(WorkerResponse::Complete { frames, count }).await
            }
        }
    }

    async fn process_batch(&mut self) -> bool {
        for _ in 0..WORKER_BATCH_SIZE {
            let Some(data) = self.queue.pop_front() else {
                break;
            };

            self.frames.push(Frame::new(data));
            self.processed += 1;

            if self.processed % WORKER_YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }

            if self.processed % WORKER_PROGRESS_EVERY == 0 {
                let now = Instant::now();
                let secs = now.duration_since(self.last_progress).as_secs_f64();
                let fps = if secs > 0.0 {
                    (WORKER_PROGRESS_EVERY as f64 / secs).round() as u32
                } else {
                    0
                };
                self.last_progress = now;

                let progress = WorkerResponse::Progress {
                    count: self.processed,
                    fps,
                };
                if !self.respond(progress).await {
                    return false;
                }
            }
        }

        true
    }

    async fn respond(&self, response: WorkerResponse) -> bool {
        if self.responses.send(response).await.is_err() {
            tracing::debug!(target: "recorder", "[WORKER] Response channel closed");
            return false;
        }
        true
    }
}
