//! The job controller actor.
//!
//! [`JobController`] is the single owner of the [`JobMachine`]. Every
//! producer (user actions, the push channel, the poll fallback and the
//! completions of remote calls) sends an [`Input`] through the mailbox of
//! a [`JobHandle`]; the actor applies them one at a time, publishes the
//! resulting [`JobSnapshot`] on a `watch` channel and executes the
//! effects. Remote calls run in their own tasks and report back as inputs,
//! so the mailbox is never blocked on the network.

use std::sync::Arc;

use sketchflow_core::machine::{Effect, Input, JobMachine, JobSnapshot};
use sketchflow_core::types::{BaseImage, GenerationRequest};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, CreateOutcome, GenerationApi};
use crate::events::ClientEvent;
use crate::origin::Origin;

/// Broadcast channel capacity for client events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Cloneable handle to a running [`JobController`].
#[derive(Clone)]
pub struct JobHandle {
    inbox: mpsc::UnboundedSender<Input>,
    snapshots: watch::Receiver<JobSnapshot>,
    events: broadcast::Sender<ClientEvent>,
}

impl JobHandle {
    /// Queue an input for the controller. Returns `false` once the
    /// controller has stopped.
    pub fn send(&self, input: Input) -> bool {
        self.inbox.send(input).is_ok()
    }

    pub fn submit(&self, request: GenerationRequest) -> bool {
        self.send(Input::Submit(request))
    }

    pub fn set_base_image(&self, base_image: BaseImage) -> bool {
        self.send(Input::SetBaseImage(base_image))
    }

    /// The latest published state.
    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that is notified on every state change.
    pub fn snapshots(&self) -> watch::Receiver<JobSnapshot> {
        self.snapshots.clone()
    }

    /// Subscribe to outbound [`ClientEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Publish an event on the controller's event channel.
    pub fn emit(&self, event: ClientEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Wait until the state satisfies `predicate`. Returns `None` if the
    /// controller stops first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<JobSnapshot>
    where
        F: FnMut(&JobSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx.wait_for(|s| predicate(s)).await.ok()?;
        Some(snapshot.clone())
    }
}

/// Owns the job state and executes the effects of every transition.
pub struct JobController {
    machine: JobMachine,
    api: Arc<dyn GenerationApi>,
    /// Resolves addresses the server returns relative to its origin.
    origin: Origin,
    inbox: mpsc::UnboundedSender<Input>,
    snapshot_tx: watch::Sender<JobSnapshot>,
    events: broadcast::Sender<ClientEvent>,
}

impl JobController {
    /// Start the controller task. It runs until `cancel` is triggered.
    pub fn spawn(
        api: Arc<dyn GenerationApi>,
        machine: JobMachine,
        origin: Origin,
        cancel: CancellationToken,
    ) -> (JobHandle, JoinHandle<()>) {
        let (inbox, mailbox) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(machine.snapshot());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let handle = JobHandle {
            inbox: inbox.clone(),
            snapshots,
            events: events.clone(),
        };

        let controller = Self {
            machine,
            api,
            origin,
            inbox,
            snapshot_tx,
            events,
        };
        let task = tokio::spawn(controller.run(mailbox, cancel));

        (handle, task)
    }

    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Input>, cancel: CancellationToken) {
        tracing::info!("Job controller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                input = mailbox.recv() => match input {
                    Some(input) => self.apply(input),
                    // Unreachable while `self.inbox` is alive.
                    None => break,
                },
            }
        }
        tracing::info!("Job controller stopped");
    }

    fn apply(&mut self, input: Input) {
        let before = self.machine.status();
        tracing::debug!(?input, "Controller input");

        let effects = self.machine.handle(input);

        let after = self.machine.status();
        if before != after {
            tracing::info!(
                job_id = self.machine.active_job().unwrap_or("-"),
                from = %before,
                to = %after,
                message = self.machine.message().unwrap_or(""),
                "Job status changed",
            );
        }

        let snapshot = self.machine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&self, effect: Effect) {
        match effect {
            Effect::CreateJob {
                dispatch,
                base_image_id,
                request,
            } => {
                let api = Arc::clone(&self.api);
                self.spawn_call(async move {
                    tracing::info!(
                        base_image_id = %base_image_id,
                        quality = %request.quality,
                        seed = ?request.seed,
                        "Submitting generation job",
                    );
                    match api.create_job(&base_image_id, &request).await {
                        Ok(CreateOutcome::Accepted {
                            job_id,
                            quality_effective,
                            degraded,
                        }) => {
                            tracing::info!(job_id = %job_id, degraded, "Generation job accepted");
                            Input::CreateAccepted {
                                dispatch,
                                job_id,
                                quality_effective,
                                degraded,
                            }
                        }
                        Ok(CreateOutcome::Skipped) => {
                            tracing::info!("Generation skipped by server (blank sketch)");
                            Input::CreateSkipped { dispatch }
                        }
                        Err(e) => failure(e, "Failed to submit generation job", |message| {
                            Input::CreateFailed { dispatch, message }
                        }),
                    }
                });
            }
            Effect::CancelJob { job_id } => {
                let api = Arc::clone(&self.api);
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    tracing::info!(job_id = %job_id, "Cancelling generation job");
                    match api.cancel_job(&job_id).await {
                        Ok(()) => {}
                        Err(ApiError::Unauthorized) => {
                            let _ = inbox.send(Input::Unauthorized);
                        }
                        // The busy job still ends on its own; keep waiting for it.
                        Err(e) => {
                            tracing::error!(job_id = %job_id, error = %e, "Failed to cancel job");
                            let _ = inbox.send(Input::CancelFailed {
                                message: e.user_message(),
                                job_id,
                            });
                        }
                    }
                });
            }
            Effect::Undo => {
                let api = Arc::clone(&self.api);
                self.spawn_call(async move {
                    match api.undo().await {
                        Ok(response) => {
                            tracing::info!(result_id = ?response.result_id, "Undo succeeded");
                            Input::UndoSucceeded
                        }
                        Err(e) => failure(e, "Undo failed", Input::UndoFailed),
                    }
                });
            }
            Effect::ApplyResult { result_url } => {
                let api = Arc::clone(&self.api);
                let origin = self.origin.clone();
                self.spawn_call(async move {
                    match api.apply_result(&result_url).await {
                        Ok(response) => {
                            tracing::info!(
                                image_id = %response.image_id,
                                "Result applied as base image",
                            );
                            let mut base_image = BaseImage::from(response);
                            base_image.url = base_image.url.map(|url| origin.resolve(&url));
                            Input::ApplySucceeded(base_image)
                        }
                        Err(e) => failure(e, "Failed to apply result", Input::ApplyFailed),
                    }
                });
            }
            Effect::ClearSketch => self.emit(ClientEvent::ClearSketchLayer),
            Effect::RedirectToLogin => {
                tracing::warn!("Session unauthorized, redirecting to login");
                self.emit(ClientEvent::RedirectToLogin);
            }
            Effect::QualityDegraded {
                job_id,
                requested,
                effective,
            } => {
                tracing::warn!(
                    job_id = %job_id,
                    requested = %requested,
                    effective = %effective,
                    "Server degraded generation quality",
                );
                self.emit(ClientEvent::QualityDegraded {
                    job_id,
                    requested,
                    effective,
                });
            }
        }
    }

    /// Run a remote call in its own task and feed its outcome back in.
    fn spawn_call<F>(&self, call: F)
    where
        F: std::future::Future<Output = Input> + Send + 'static,
    {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let input = call.await;
            let _ = inbox.send(input);
        });
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

/// Map a failed remote call to its input: 401 always becomes
/// [`Input::Unauthorized`], everything else becomes `on_error(message)`.
fn failure(error: ApiError, context: &str, on_error: impl FnOnce(String) -> Input) -> Input {
    if error.is_unauthorized() {
        return Input::Unauthorized;
    }
    tracing::error!(error = %error, "{context}");
    on_error(error.user_message())
}
