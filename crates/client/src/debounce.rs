//! Trailing-edge debounce stage upstream of submission.
//!
//! Canvas strokes and prompt edits arrive in bursts. Each capture restarts
//! the quiet window; when the window elapses with no newer capture, only
//! the latest value is forwarded.

use std::time::Duration;

use sketchflow_core::types::GenerationRequest;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default quiet window.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(350);

/// The capture stage in front of [`JobHandle::submit`](crate::controller::JobHandle::submit).
pub type CaptureDebouncer = Debouncer<GenerationRequest>;

/// Input side of a running debounce task.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn a debounce task that calls `forward` with the latest value
    /// once `window` passes without a newer one.
    ///
    /// A value still waiting when every sender is dropped is forwarded
    /// immediately; one waiting when `cancel` fires is discarded.
    pub fn spawn<F>(window: Duration, forward: F, cancel: CancellationToken) -> Self
    where
        F: Fn(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(window, rx, forward, cancel));
        Self { tx, task }
    }

    /// Offer a new value. Returns `false` once the task has stopped.
    pub fn capture(&self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    /// Drop the input side, flush any waiting value and wait for the task.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

async fn run<T, F>(
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<T>,
    forward: F,
    cancel: CancellationToken,
) where
    F: Fn(T),
{
    loop {
        let mut latest = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            value = rx.recv() => match value {
                Some(value) => value,
                None => return,
            },
        };

        let mut coalesced = 0u32;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                value = rx.recv() => match value {
                    Some(value) => {
                        latest = value;
                        coalesced += 1;
                    }
                    None => {
                        forward(latest);
                        return;
                    }
                },
                _ = tokio::time::sleep(window) => {
                    tracing::trace!(coalesced, "Debounce window elapsed");
                    forward(latest);
                    break;
                }
            }
        }
    }
}
