use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_secs(1);

/// Per-second elapsed-time ticker for the active session. Stops and resets the
/// elapsed count to zero when dropped.
pub struct RecordingTimer {
    task: JoinHandle<()>,
    elapsed_tx: Arc<watch::Sender<u64>>,
}

impl RecordingTimer {
    pub fn start(started_at: Instant, elapsed_tx: Arc<watch::Sender<u64>>) -> Self {
        elapsed_tx.send_replace(0);

        let ticker_tx = elapsed_tx.clone();
        let task = tokio::spawn(async move {
            let first = tokio::time::Instant::from_std(started_at) + TICK;
            let mut interval = tokio::time::interval_at(first, TICK);

            loop {
                interval.tick().await;
                let secs = started_at.elapsed().as_secs();
                ticker_tx.send_replace(secs);
                tracing::trace!(target: "recorder", "[TIMER] {}", format_elapsed(secs));
            }
        });

        Self { task, elapsed_tx }
    }
}

impl Drop for RecordingTimer {
    fn drop(&mut self) {
        self.task.abort();
        self.elapsed_tx.send_replace(0);
    }
}

/// `MM:SS`, minutes keep growing past an hour.
pub fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
