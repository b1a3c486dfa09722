//! Job lifecycle state machine.
//!
//! [`JobMachine`] is the transition table for the single generation job a
//! client session may have in flight. It performs no I/O: every call to
//! [`JobMachine::handle`] applies one [`Input`] and returns the
//! [`Effect`]s the caller must execute (remote calls, collaborator
//! signals). Outcomes of those effects come back as further inputs.
//!
//! Both delivery paths (push channel and status poll) feed
//! [`Input::Job`], so the machine cannot tell them apart.

use crate::error::CoreError;
use crate::history::ResultHistory;
use crate::types::{
    BaseImage, GenerationRequest, JobId, JobStatus, Quality, ResultItem, ResultPayload,
};

/// Message shown when the server reports a failure without one.
pub const GENERIC_ERROR_MESSAGE: &str = "Generation failed";

/// Sequence number of one create-job call. Its outcome echoes it back so
/// answers to superseded calls can be told apart.
pub type DispatchId = u64;

/// Everything that can drive a transition.
#[derive(Debug, Clone)]
pub enum Input {
    /// A new generation intent from the editor.
    Submit(GenerationRequest),
    SetBaseImage(BaseImage),
    /// Replay the last request at normal quality.
    Regenerate,
    /// Replay the last request at high quality with the current result's seed.
    Improve,
    Undo,
    ApplyResult,
    Select(String),

    /// The create-job call returned a job id.
    CreateAccepted {
        dispatch: DispatchId,
        job_id: JobId,
        quality_effective: Option<Quality>,
        degraded: bool,
    },
    /// The server declined to create a job (blank sketch).
    CreateSkipped { dispatch: DispatchId },
    CreateFailed {
        dispatch: DispatchId,
        message: String,
    },
    /// The cancel call for a busy job failed; the job runs on.
    CancelFailed { job_id: JobId, message: String },

    /// A status, result, error or cancellation for a job.
    Job(JobEvent),

    UndoSucceeded,
    UndoFailed(String),
    ApplySucceeded(BaseImage),
    ApplyFailed(String),

    /// A remote call or the push channel reported the session as unauthorized.
    Unauthorized,
}

/// A job update from either delivery path.
///
/// `job_id` is optional because push frames for the subscribed job may
/// omit it; when present it must match the active job.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Non-terminal progress: `queued` or `running`.
    Status {
        job_id: Option<JobId>,
        status: JobStatus,
    },
    Result(ResultPayload),
    Error {
        job_id: Option<JobId>,
        message: Option<String>,
    },
    Cancelled { job_id: Option<JobId> },
}

/// Work the caller must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CreateJob {
        dispatch: DispatchId,
        base_image_id: String,
        request: GenerationRequest,
    },
    CancelJob { job_id: JobId },
    Undo,
    ApplyResult { result_url: String },
    /// Tell the canvas to clear its sketch layer.
    ClearSketch,
    /// Hand control to the login collaborator.
    RedirectToLogin,
    /// The server substituted a lower quality tier than requested.
    QualityDegraded {
        job_id: JobId,
        requested: Quality,
        effective: Quality,
    },
}

/// State of the single job slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Slot {
    #[default]
    Free,
    /// A create-job call is in flight; no job id yet.
    Dispatching {
        dispatch: DispatchId,
        quality: Quality,
    },
    Busy(BusyPeriod),
}

/// Bookkeeping for one busy period. Dropped as a whole when the job
/// reaches a terminal state, which also clears the cancel flag.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BusyPeriod {
    job_id: JobId,
    cancel_requested: bool,
    quality: Quality,
    degraded: bool,
}

/// Read-only view of the machine, published to the display surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub message: Option<String>,
    pub active_job: Option<JobId>,
    pub dispatching: bool,
    pub cancel_requested: bool,
    pub has_pending: bool,
    pub degraded: bool,
    pub history: Vec<ResultItem>,
    pub current: Option<ResultItem>,
    pub base_image: Option<BaseImage>,
    pub can_regenerate: bool,
    /// Submissions handled so far, including regenerate and improve.
    pub submissions: u64,
    /// The session was rejected and nothing was submitted since.
    pub signed_out: bool,
}

impl JobSnapshot {
    /// `true` while a job is queued or running.
    pub fn is_busy(&self) -> bool {
        self.status.is_busy()
    }
}

/// The job controller's transition table.
#[derive(Debug, Default)]
pub struct JobMachine {
    status: JobStatus,
    message: Option<String>,
    slot: Slot,
    pending: Option<GenerationRequest>,
    last_request: Option<GenerationRequest>,
    base_image: Option<BaseImage>,
    history: ResultHistory,
    degraded: bool,
    /// Set after an unauthorized reset so repeated 401s redirect only once.
    signed_out: bool,
    submissions: u64,
    /// Id of the most recent create-job call.
    last_dispatch: DispatchId,
}

impl JobMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_image(base_image: BaseImage) -> Self {
        Self {
            base_image: Some(base_image),
            ..Self::default()
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn active_job(&self) -> Option<&str> {
        match &self.slot {
            Slot::Busy(period) => Some(&period.job_id),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&GenerationRequest> {
        self.pending.as_ref()
    }

    pub fn history(&self) -> &ResultHistory {
        &self.history
    }

    pub fn base_image(&self) -> Option<&BaseImage> {
        self.base_image.as_ref()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let (active_job, cancel_requested) = match &self.slot {
            Slot::Busy(period) => (Some(period.job_id.clone()), period.cancel_requested),
            _ => (None, false),
        };
        JobSnapshot {
            status: self.status,
            message: self.message.clone(),
            active_job,
            dispatching: matches!(self.slot, Slot::Dispatching { .. }),
            cancel_requested,
            has_pending: self.pending.is_some(),
            degraded: self.degraded,
            history: self.history.items().to_vec(),
            current: self.history.current().cloned(),
            base_image: self.base_image.clone(),
            can_regenerate: self.last_request.is_some(),
            submissions: self.submissions,
            signed_out: self.signed_out,
        }
    }

    /// Apply one input and return the effects to execute.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Unauthorized => self.reset_unauthorized(),
            Input::Submit(request) => self.submit(request),
            Input::SetBaseImage(base_image) => {
                self.base_image = Some(base_image);
                Vec::new()
            }
            Input::Regenerate => match self.last_request.clone() {
                Some(last) => self.submit(last.with_quality(Quality::Normal).with_seed(None)),
                None => Vec::new(),
            },
            Input::Improve => {
                let seed = self.history.current().and_then(|item| item.seed);
                match (seed, self.last_request.clone()) {
                    (Some(seed), Some(last)) => {
                        self.submit(last.with_quality(Quality::High).with_seed(Some(seed)))
                    }
                    _ => Vec::new(),
                }
            }
            Input::Undo => {
                if self.history.is_empty() || self.slot != Slot::Free {
                    Vec::new()
                } else {
                    vec![Effect::Undo]
                }
            }
            Input::ApplyResult => match self.history.current() {
                Some(item) => vec![Effect::ApplyResult {
                    result_url: item.url.clone(),
                }],
                None => Vec::new(),
            },
            Input::Select(id) => {
                self.history.select(&id);
                Vec::new()
            }
            Input::CreateAccepted {
                dispatch,
                job_id,
                quality_effective,
                degraded,
            } => self.accept(dispatch, job_id, quality_effective, degraded),
            Input::CreateSkipped { dispatch } => {
                if !self.is_dispatching(dispatch) {
                    return Vec::new();
                }
                self.slot = Slot::Free;
                self.set_status(JobStatus::Idle, None);
                self.replay_pending()
            }
            Input::CreateFailed { dispatch, message } => {
                if !self.is_dispatching(dispatch) {
                    return Vec::new();
                }
                self.slot = Slot::Free;
                self.set_status(JobStatus::Error, Some(message));
                self.replay_pending()
            }
            Input::CancelFailed { job_id, message } => {
                if self.matching_period(Some(&job_id)).is_some() {
                    self.message = Some(format!(
                        "Could not cancel the running job ({message}); \
                         the new request starts when it finishes"
                    ));
                }
                Vec::new()
            }
            Input::Job(event) => self.job_event(event),
            Input::UndoSucceeded => {
                self.history.drop_newest();
                if !self.is_busy() {
                    self.set_status(JobStatus::Done, None);
                }
                Vec::new()
            }
            Input::UndoFailed(message) | Input::ApplyFailed(message) => {
                if !self.is_busy() {
                    self.set_status(JobStatus::Error, Some(message));
                }
                Vec::new()
            }
            Input::ApplySucceeded(base_image) => {
                self.base_image = Some(base_image);
                vec![Effect::ClearSketch]
            }
        }
    }

    // ---- transitions ----

    fn submit(&mut self, request: GenerationRequest) -> Vec<Effect> {
        self.signed_out = false;
        self.submissions += 1;
        self.last_request = Some(request.clone());

        if self.slot == Slot::Free {
            return self.dispatch(request);
        }

        self.pending = Some(request);
        match &mut self.slot {
            Slot::Busy(period) if !period.cancel_requested => {
                period.cancel_requested = true;
                vec![Effect::CancelJob {
                    job_id: period.job_id.clone(),
                }]
            }
            // Still dispatching, or the cancel for this busy period is
            // already out.
            _ => Vec::new(),
        }
    }

    fn dispatch(&mut self, request: GenerationRequest) -> Vec<Effect> {
        let Some(base_image) = &self.base_image else {
            self.set_status(
                JobStatus::Error,
                Some(CoreError::MissingBaseImage.to_string()),
            );
            return Vec::new();
        };
        let base_image_id = base_image.id.clone();
        self.last_dispatch += 1;
        let dispatch = self.last_dispatch;
        self.slot = Slot::Dispatching {
            dispatch,
            quality: request.quality,
        };
        vec![Effect::CreateJob {
            dispatch,
            base_image_id,
            request,
        }]
    }

    fn accept(
        &mut self,
        dispatch: DispatchId,
        job_id: JobId,
        quality_effective: Option<Quality>,
        degraded: bool,
    ) -> Vec<Effect> {
        let requested = match self.slot {
            Slot::Dispatching {
                dispatch: current,
                quality,
            } if current == dispatch => quality,
            // The call was superseded by a reset; nobody tracks this job.
            _ => return vec![Effect::CancelJob { job_id }],
        };
        let effective = quality_effective.unwrap_or(requested);
        let mut effects = Vec::new();
        if degraded {
            effects.push(Effect::QualityDegraded {
                job_id: job_id.clone(),
                requested,
                effective,
            });
        }

        // A newer intent arrived while the create call was in flight; the
        // job we just got is already stale.
        let cancel_requested = self.pending.is_some();
        if cancel_requested {
            effects.push(Effect::CancelJob {
                job_id: job_id.clone(),
            });
        }

        self.slot = Slot::Busy(BusyPeriod {
            job_id,
            cancel_requested,
            quality: effective,
            degraded,
        });
        self.degraded = degraded;
        self.set_status(JobStatus::Queued, None);
        effects
    }

    fn job_event(&mut self, event: JobEvent) -> Vec<Effect> {
        match event {
            JobEvent::Status { job_id, status } => {
                if status.is_busy() && self.matching_period(job_id.as_deref()).is_some() {
                    self.status = status;
                }
                Vec::new()
            }
            JobEvent::Result(payload) => {
                let Some(period) = self.matching_period(payload.job_id.as_deref()) else {
                    return Vec::new();
                };
                let item = ResultItem {
                    id: period.job_id.clone(),
                    url: payload.url,
                    relative_url: payload.relative_url,
                    seed: payload.seed,
                    quality: payload.quality_effective.unwrap_or(period.quality),
                    degraded: payload.quality_degraded.unwrap_or(period.degraded),
                    download_token: payload.download_token,
                };
                self.history.push(item);
                self.finish(JobStatus::Done, None)
            }
            JobEvent::Error { job_id, message } => {
                if self.matching_period(job_id.as_deref()).is_none() {
                    return Vec::new();
                }
                let message = message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
                self.finish(JobStatus::Error, Some(message))
            }
            JobEvent::Cancelled { job_id } => {
                if self.matching_period(job_id.as_deref()).is_none() {
                    return Vec::new();
                }
                self.finish(JobStatus::Cancelled, None)
            }
        }
    }

    /// Leave the busy period with a terminal status, then replay any pending
    /// request exactly once.
    fn finish(&mut self, status: JobStatus, message: Option<String>) -> Vec<Effect> {
        self.slot = Slot::Free;
        self.degraded = false;
        self.set_status(status, message);
        self.replay_pending()
    }

    fn replay_pending(&mut self) -> Vec<Effect> {
        match self.pending.take() {
            Some(request) => self.dispatch(request),
            None => Vec::new(),
        }
    }

    fn reset_unauthorized(&mut self) -> Vec<Effect> {
        self.slot = Slot::Free;
        self.pending = None;
        self.degraded = false;
        self.set_status(JobStatus::Idle, None);
        if self.signed_out {
            return Vec::new();
        }
        self.signed_out = true;
        vec![Effect::RedirectToLogin]
    }

    // ---- helpers ----

    fn matching_period(&self, job_id: Option<&str>) -> Option<&BusyPeriod> {
        match (&self.slot, job_id) {
            (Slot::Busy(period), None) => Some(period),
            (Slot::Busy(period), Some(id)) if period.job_id == id => Some(period),
            _ => None,
        }
    }

    fn is_busy(&self) -> bool {
        matches!(self.slot, Slot::Busy(_))
    }

    fn is_dispatching(&self, dispatch: DispatchId) -> bool {
        matches!(self.slot, Slot::Dispatching { dispatch: current, .. } if current == dispatch)
    }

    fn set_status(&mut self, status: JobStatus, message: Option<String>) {
        self.status = status;
        self.message = message;
    }
}
