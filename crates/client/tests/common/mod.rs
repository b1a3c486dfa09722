#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sketchflow_client::api::{
    ApiError, ApplyResponse, CreateOutcome, GenerationApi, JobStatusResponse, UndoResponse,
};
use sketchflow_client::controller::{JobController, JobHandle};
use sketchflow_client::origin::Origin;
use sketchflow_core::machine::{JobMachine, JobSnapshot};
use sketchflow_core::types::{BaseImage, GenerationRequest, ImagePayload, JobStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound for every wait in these tests.
pub const WAIT: Duration = Duration::from_secs(3);

pub const ORIGIN: &str = "http://localhost:8000";

/// A remote call recorded by [`FakeApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create {
        base_image_id: String,
        request: GenerationRequest,
    },
    Cancel(String),
    Status(String),
    Undo,
    Apply(String),
}

/// Recording [`GenerationApi`] with scripted answers.
///
/// When no answer is scripted: create accepts with `job-1`, `job-2`, ...;
/// cancel, undo and apply succeed; status reports the job as `queued`.
#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    creates: Mutex<VecDeque<Result<CreateOutcome, ApiError>>>,
    cancels: Mutex<VecDeque<Result<(), ApiError>>>,
    statuses: Mutex<VecDeque<Result<JobStatusResponse, ApiError>>>,
    undos: Mutex<VecDeque<Result<UndoResponse, ApiError>>>,
    applies: Mutex<VecDeque<Result<ApplyResponse, ApiError>>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<GenerationRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create { request, .. } => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Cancel(job_id) => Some(job_id),
                _ => None,
            })
            .collect()
    }

    pub fn status_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Status(_)))
            .count()
    }

    pub fn script_create(&self, result: Result<CreateOutcome, ApiError>) {
        self.creates.lock().unwrap().push_back(result);
    }

    pub fn script_cancel(&self, result: Result<(), ApiError>) {
        self.cancels.lock().unwrap().push_back(result);
    }

    pub fn script_status(&self, result: Result<JobStatusResponse, ApiError>) {
        self.statuses.lock().unwrap().push_back(result);
    }

    pub fn script_undo(&self, result: Result<UndoResponse, ApiError>) {
        self.undos.lock().unwrap().push_back(result);
    }

    pub fn script_apply(&self, result: Result<ApplyResponse, ApiError>) {
        self.applies.lock().unwrap().push_back(result);
    }

    fn record(&self, call: Call) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        calls.len()
    }

    fn next_job_number(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create { .. }))
            .count()
    }
}

#[async_trait]
impl GenerationApi for FakeApi {
    async fn create_job(
        &self,
        base_image_id: &str,
        request: &GenerationRequest,
    ) -> Result<CreateOutcome, ApiError> {
        self.record(Call::Create {
            base_image_id: base_image_id.to_string(),
            request: request.clone(),
        });
        let scripted = self.creates.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(CreateOutcome::Accepted {
                job_id: format!("job-{}", self.next_job_number()),
                quality_effective: None,
                degraded: false,
            })
        })
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        self.record(Call::Cancel(job_id.to_string()));
        let scripted = self.cancels.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        self.record(Call::Status(job_id.to_string()));
        let scripted = self.statuses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(status(job_id, JobStatus::Queued)))
    }

    async fn undo(&self) -> Result<UndoResponse, ApiError> {
        self.record(Call::Undo);
        let scripted = self.undos.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(UndoResponse {
            result_id: None,
            result_url: None,
            seed: None,
            quality: None,
        }))
    }

    async fn apply_result(&self, result_url: &str) -> Result<ApplyResponse, ApiError> {
        self.record(Call::Apply(result_url.to_string()));
        let scripted = self.applies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ApplyResponse {
                image_id: "img-applied".into(),
                url: Some("/api/image/img-applied".into()),
            })
        })
    }
}

/// A poll answer with only `job_id` and `status` set.
pub fn status(job_id: &str, status: JobStatus) -> JobStatusResponse {
    JobStatusResponse {
        job_id: job_id.to_string(),
        status,
        result_url: None,
        seed: None,
        quality_effective: None,
        quality_degraded: None,
        download_token: None,
        error_message: None,
    }
}

pub fn origin() -> Origin {
    Origin::parse(ORIGIN).unwrap()
}

pub fn request(tag: u8) -> GenerationRequest {
    GenerationRequest::new(ImagePayload::from(vec![tag])).with_prompt(format!("prompt {tag}"))
}

/// A controller with base image `img-1`, backed by `api`.
pub struct Harness {
    pub api: Arc<FakeApi>,
    pub handle: JobHandle,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start(api: Arc<FakeApi>) -> Self {
        Self::start_with(api, JobMachine::with_base_image(BaseImage::new("img-1")))
    }

    pub fn start_with(api: Arc<FakeApi>, machine: JobMachine) -> Self {
        let cancel = CancellationToken::new();
        let (handle, task) = JobController::spawn(api.clone(), machine, origin(), cancel.clone());
        Self {
            api,
            handle,
            cancel,
            task,
        }
    }

    /// Wait until the snapshot satisfies `predicate`, failing the test
    /// after [`WAIT`].
    pub async fn wait_for<F>(&self, what: &str, predicate: F) -> JobSnapshot
    where
        F: FnMut(&JobSnapshot) -> bool,
    {
        match tokio::time::timeout(WAIT, self.handle.wait_for(predicate)).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => panic!("controller stopped while waiting for {what}"),
            Err(_) => panic!(
                "timed out waiting for {what}; last snapshot: {:?}",
                self.handle.snapshot()
            ),
        }
    }

    /// Submit and wait until the job is accepted as `job_id`.
    pub async fn submit_accepted(&self, tag: u8, job_id: &str) -> JobSnapshot {
        self.handle.submit(request(tag));
        self.wait_for(job_id, |s| s.active_job.as_deref() == Some(job_id)).await
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Poll `condition` until it holds, failing the test after [`WAIT`].
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
