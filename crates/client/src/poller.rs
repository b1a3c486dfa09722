//! Status-poll fallback.
//!
//! While the controller has a busy job and the push channel is down, asks
//! `GET /generate/status/{job_id}` on a fixed interval and feeds the answer
//! into the same controller entry points the push channel uses. Stands
//! down while the push channel is connected and stops as soon as the job
//! leaves the busy state.

use std::sync::Arc;
use std::time::Duration;

use sketchflow_core::machine::{Input, JobEvent, JobSnapshot};
use sketchflow_core::types::JobId;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, GenerationApi};
use crate::controller::JobHandle;
use crate::origin::Origin;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// The job the poller should track, if any.
pub fn next_busy_job(snapshot: &JobSnapshot) -> Option<JobId> {
    if snapshot.is_busy() {
        snapshot.active_job.clone()
    } else {
        None
    }
}

/// Background status poller.
pub struct StatusPoller {
    api: Arc<dyn GenerationApi>,
    handle: JobHandle,
    origin: Origin,
    connected: watch::Receiver<bool>,
    interval: Duration,
}

impl StatusPoller {
    /// `connected` is the push channel's connected flag; polls are skipped
    /// while it reads `true`.
    pub fn new(
        api: Arc<dyn GenerationApi>,
        handle: JobHandle,
        origin: Origin,
        connected: watch::Receiver<bool>,
    ) -> Self {
        Self {
            api,
            handle,
            origin,
            connected,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the poll loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.interval.as_millis() as u64,
            "Status poller started",
        );
        let mut snapshots = self.handle.snapshots();

        loop {
            let job_id = {
                let ready = tokio::select! {
                    _ = cancel.cancelled() => break,
                    ready = snapshots.wait_for(|s| next_busy_job(s).is_some()) => ready,
                };
                match ready {
                    Ok(snapshot) => next_busy_job(&snapshot),
                    // The controller is gone.
                    Err(_) => break,
                }
            };
            let Some(job_id) = job_id else {
                continue;
            };

            if !self.poll_job(&job_id, &mut snapshots, &cancel).await {
                break;
            }
        }

        tracing::info!("Status poller shutting down");
    }

    /// Poll `job_id` until it is no longer the busy job. Returns `false`
    /// when the poller should exit.
    async fn poll_job(
        &self,
        job_id: &str,
        snapshots: &mut watch::Receiver<JobSnapshot>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = ticker.tick() => {
                    if self.still_busy(job_id, snapshots) {
                        self.poll_once(job_id).await;
                    }
                }
            }

            if !self.still_busy(job_id, snapshots) {
                tracing::debug!(job_id, "Job left busy state, polling stopped");
                return true;
            }
        }
    }

    fn still_busy(&self, job_id: &str, snapshots: &mut watch::Receiver<JobSnapshot>) -> bool {
        next_busy_job(&snapshots.borrow_and_update()).as_deref() == Some(job_id)
    }

    async fn poll_once(&self, job_id: &str) {
        if *self.connected.borrow() {
            tracing::trace!(job_id, "Push channel connected, skipping poll");
            return;
        }

        match self.api.job_status(job_id).await {
            Ok(response) => {
                tracing::debug!(job_id, status = %response.status, "Polled job status");
                if let Some(input) = response.into_input(&self.origin) {
                    self.handle.send(input);
                }
            }
            Err(ApiError::Unauthorized) => {
                self.handle.send(Input::Unauthorized);
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(job_id, "Polled job no longer exists");
                self.handle.send(Input::Job(JobEvent::Error {
                    job_id: Some(job_id.to_string()),
                    message: Some(e.user_message()),
                }));
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Status poll failed");
            }
        }
    }
}
