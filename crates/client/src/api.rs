//! REST API client for the generation backend.
//!
//! Wraps the job endpoints (create, cancel, status) and the two history
//! actions (undo, apply-result) using [`reqwest`]. Every request carries
//! the session id as a `sid` cookie when one is known.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use sketchflow_core::machine::{Input, JobEvent};
use sketchflow_core::types::{
    BaseImage, GenerationRequest, ImagePayload, JobId, JobStatus, Quality, ResultPayload,
};

use crate::origin::Origin;
use crate::session::SessionProvider;

/// Outcome of a create-job call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Accepted {
        job_id: JobId,
        quality_effective: Option<Quality>,
        degraded: bool,
    },
    /// The server saw a blank sketch and did not create a job.
    Skipped,
}

/// Remote operations the job controller depends on.
///
/// [`HttpGenerationApi`] is the production implementation; tests supply a
/// recording fake.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    async fn create_job(
        &self,
        base_image_id: &str,
        request: &GenerationRequest,
    ) -> Result<CreateOutcome, ApiError>;

    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError>;

    async fn undo(&self) -> Result<UndoResponse, ApiError>;

    async fn apply_result(&self, result_url: &str) -> Result<ApplyResponse, ApiError>;
}

/// Response of `POST /generate`.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    job_id: Option<String>,
    status: Option<String>,
    quality_effective: Option<Quality>,
    #[serde(default)]
    quality_degraded: Option<bool>,
}

/// Response of `GET /generate/status/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub seed: Option<u64>,
    pub quality_effective: Option<Quality>,
    pub quality_degraded: Option<bool>,
    pub download_token: Option<String>,
    pub error_message: Option<String>,
}

impl JobStatusResponse {
    /// Translate a poll response into the controller input it stands for.
    ///
    /// Returns `None` for `idle`, and for `done` without a result address.
    pub fn into_input(self, origin: &Origin) -> Option<Input> {
        let job_id = Some(self.job_id);
        let event = match self.status {
            JobStatus::Queued | JobStatus::Running => JobEvent::Status {
                job_id,
                status: self.status,
            },
            JobStatus::Done => {
                let relative_url = self.result_url?;
                JobEvent::Result(ResultPayload {
                    job_id,
                    url: origin.resolve(&relative_url),
                    relative_url,
                    seed: self.seed,
                    quality_effective: self.quality_effective,
                    quality_degraded: self.quality_degraded,
                    download_token: self.download_token,
                })
            }
            JobStatus::Error => JobEvent::Error {
                job_id,
                message: self.error_message,
            },
            JobStatus::Cancelled => JobEvent::Cancelled { job_id },
            JobStatus::Idle => return None,
        };
        Some(Input::Job(event))
    }
}

/// Response of `POST /history/undo`.
#[derive(Debug, Clone, Deserialize)]
pub struct UndoResponse {
    pub result_id: Option<String>,
    pub result_url: Option<String>,
    pub seed: Option<u64>,
    pub quality: Option<Quality>,
}

/// Response of `POST /canvas/apply-result`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyResponse {
    pub image_id: String,
    pub url: Option<String>,
}

impl From<ApplyResponse> for BaseImage {
    fn from(response: ApplyResponse) -> Self {
        Self {
            id: response.image_id,
            url: response.url,
        }
    }
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered 401.
    #[error("Unauthorized")]
    Unauthorized,

    /// The server returned a non-2xx status code.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A 2xx response whose body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Message suitable for the status line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// HTTP client for the generation backend.
pub struct HttpGenerationApi {
    client: reqwest::Client,
    api_url: String,
    session: Arc<dyn SessionProvider>,
}

impl HttpGenerationApi {
    /// * `api_url` - Base URL including the API prefix, e.g.
    ///   `http://host:8000/api`.
    pub fn new(api_url: String, session: Arc<dyn SessionProvider>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, session)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: String,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.session_id() {
            Some(sid) => builder.header(COOKIE, format!("sid={sid}")),
            None => builder,
        }
    }

    fn generate_form(base_image_id: &str, request: &GenerationRequest) -> Result<Form, ApiError> {
        let mut form = Form::new()
            .text("base_image_id", base_image_id.to_string())
            .text("prompt", request.prompt.clone())
            .text("quality", request.quality.as_str())
            .text("request_id", uuid::Uuid::new_v4().to_string())
            .part("sketch_png", png_part(&request.sketch, "sketch.png")?);
        if let Some(language) = &request.ui_language {
            form = form.text("ui_language", language.clone());
        }
        if let Some(seed) = request.seed {
            form = form.text("seed", seed.to_string());
        }
        if let Some(canvas) = &request.canvas {
            form = form.part("canvas_png", png_part(canvas, "canvas.png")?);
        }
        Ok(form)
    }

    /// Ensure the response has a success status code. 401 becomes
    /// [`ApiError::Unauthorized`]; other failures carry the server's
    /// error message when the body has one.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or(body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl GenerationApi for HttpGenerationApi {
    async fn create_job(
        &self,
        base_image_id: &str,
        request: &GenerationRequest,
    ) -> Result<CreateOutcome, ApiError> {
        let form = Self::generate_form(base_image_id, request)?;
        let response = self
            .authorize(self.client.post(self.url("/generate")))
            .multipart(form)
            .send()
            .await?;

        let body: CreateResponse = Self::parse_response(response).await?;
        create_outcome(body)
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        let response = self
            .authorize(self.client.post(self.url("/generate/cancel")))
            .json(&serde_json::json!({ "job_id": job_id }))
            .send()
            .await?;

        Self::check_status(response).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        let response = self
            .authorize(
                self.client
                    .get(self.url(&format!("/generate/status/{job_id}"))),
            )
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn undo(&self) -> Result<UndoResponse, ApiError> {
        let response = self
            .authorize(self.client.post(self.url("/history/undo")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn apply_result(&self, result_url: &str) -> Result<ApplyResponse, ApiError> {
        let response = self
            .authorize(self.client.post(self.url("/canvas/apply-result")))
            .json(&serde_json::json!({ "result_url": result_url }))
            .send()
            .await?;

        Self::parse_response(response).await
    }
}

fn png_part(payload: &ImagePayload, file_name: &'static str) -> Result<Part, ApiError> {
    Part::bytes(payload.as_bytes().to_vec())
        .file_name(file_name)
        .mime_str("image/png")
        .map_err(ApiError::from)
}

fn create_outcome(body: CreateResponse) -> Result<CreateOutcome, ApiError> {
    if body.status.as_deref() == Some("skipped") {
        return Ok(CreateOutcome::Skipped);
    }
    let job_id = body
        .job_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Decode("create response has no job_id".into()))?;
    Ok(CreateOutcome::Accepted {
        job_id,
        quality_effective: body.quality_effective,
        degraded: body.quality_degraded.unwrap_or(false),
    })
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{error:{message}}`, `{detail:{error:{message}}}`,
/// `{detail:"..."}` and `{error:"..."}`.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.pointer("/error/message"),
        value.pointer("/detail/error/message"),
        value.get("detail"),
        value.get("error"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .map(str::to_string);
    message
}
