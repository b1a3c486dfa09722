//! Push-channel message types and parser.
//!
//! The server sends flat JSON frames tagged by `"type"`:
//! `status`, `result`, `error` and `cancelled`. The client sends a single
//! kind of frame, [`SubscribeRequest`].

use serde::{Deserialize, Serialize};
use sketchflow_core::machine::{Input, JobEvent};
use sketchflow_core::types::{JobStatus, Quality, ResultPayload};

use crate::origin::Origin;

/// Message the server sends when the session is not (or no longer) valid.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// All known server-to-client frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Progress of the subscribed job.
    Status {
        job_id: Option<String>,
        value: JobStatus,
    },

    /// The subscribed job finished with an image.
    Result {
        job_id: Option<String>,
        result_url: String,
        seed: Option<u64>,
        quality_effective: Option<Quality>,
        quality_degraded: Option<bool>,
        download_token: Option<String>,
    },

    /// The job failed, or the subscription itself was rejected.
    Error {
        job_id: Option<String>,
        message: Option<String>,
    },

    Cancelled { job_id: Option<String> },
}

impl ServerMessage {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Status { job_id, .. }
            | Self::Result { job_id, .. }
            | Self::Error { job_id, .. }
            | Self::Cancelled { job_id } => job_id.as_deref(),
        }
    }

    /// Translate a frame into the controller input it stands for.
    ///
    /// `status` frames carrying a terminal value other than `cancelled` are
    /// dropped: the server follows them with the matching `result` or
    /// `error` frame.
    pub fn into_input(self, origin: &Origin) -> Option<Input> {
        let event = match self {
            Self::Status { job_id, value } => match value {
                JobStatus::Queued | JobStatus::Running => JobEvent::Status {
                    job_id,
                    status: value,
                },
                JobStatus::Cancelled => JobEvent::Cancelled { job_id },
                JobStatus::Idle | JobStatus::Done | JobStatus::Error => return None,
            },
            Self::Result {
                job_id,
                result_url,
                seed,
                quality_effective,
                quality_degraded,
                download_token,
            } => JobEvent::Result(ResultPayload {
                job_id,
                url: origin.resolve(&result_url),
                relative_url: result_url,
                seed,
                quality_effective,
                quality_degraded,
                download_token,
            }),
            Self::Error { message, .. } if message.as_deref() == Some(UNAUTHORIZED_MESSAGE) => {
                return Some(Input::Unauthorized);
            }
            Self::Error { job_id, message } => JobEvent::Error { job_id, message },
            Self::Cancelled { job_id } => JobEvent::Cancelled { job_id },
        };
        Some(Input::Job(event))
    }
}

/// The client's subscribe frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest<'a> {
    pub action: &'static str,
    pub job_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<&'a str>,
}

impl<'a> SubscribeRequest<'a> {
    pub fn new(job_id: &'a str, sid: Option<&'a str>) -> Self {
        Self {
            action: "subscribe",
            job_id,
            sid,
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a struct of plain strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parse a push-channel text frame into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
/// Callers should log and continue.
pub fn parse_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}
