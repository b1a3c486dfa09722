//! Shared domain types for generation jobs.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Opaque server-assigned job identifier.
pub type JobId = String;

/// Lifecycle status of the single job a client session may have in flight.
///
/// Exactly one value is held at a time by the [`JobMachine`](crate::machine::JobMachine);
/// it is never tracked per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    /// `queued` or `running`.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// `done`, `error` or `cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// Requested (or effective) generation quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Fast,
    #[default]
    Normal,
    /// Only used by the "improve" action, which needs the seed of a prior result.
    High,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(CoreError::UnknownQuality(other.to_string())),
        }
    }
}

/// An opaque PNG raster produced by the canvas.
///
/// Backed by an `Arc` so replaying a request (regenerate, improve, pending
/// replay) never copies the image bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload(Arc<[u8]>);

impl ImagePayload {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ImagePayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImagePayload({} bytes)", self.0.len())
    }
}

/// One generation intent captured from the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// The sketch layer (strokes only).
    pub sketch: ImagePayload,
    /// The full composited canvas, when the editor has one.
    pub canvas: Option<ImagePayload>,
    pub prompt: String,
    pub ui_language: Option<String>,
    pub quality: Quality,
    pub seed: Option<u64>,
}

impl GenerationRequest {
    pub fn new(sketch: ImagePayload) -> Self {
        Self {
            sketch,
            canvas: None,
            prompt: String::new(),
            ui_language: None,
            quality: Quality::Normal,
            seed: None,
        }
    }

    pub fn with_canvas(mut self, canvas: ImagePayload) -> Self {
        self.canvas = Some(canvas);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_ui_language(mut self, language: impl Into<String>) -> Self {
        self.ui_language = Some(language.into());
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// The image every submission is generated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseImage {
    pub id: String,
    pub url: Option<String>,
}

impl BaseImage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
        }
    }
}

/// A finished result as delivered by the push channel or the status poll,
/// with its address already resolved against the public origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPayload {
    pub job_id: Option<JobId>,
    /// Absolute address of the result image.
    pub url: String,
    /// Address as sent by the server (usually `/api/result/...`).
    pub relative_url: String,
    pub seed: Option<u64>,
    pub quality_effective: Option<Quality>,
    pub quality_degraded: Option<bool>,
    pub download_token: Option<String>,
}

/// A completed result kept in the [`ResultHistory`](crate::history::ResultHistory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    /// The job id that produced this result.
    pub id: String,
    pub url: String,
    pub relative_url: String,
    pub seed: Option<u64>,
    /// Quality tier the server actually used.
    pub quality: Quality,
    /// `true` when the server substituted a lower tier than requested.
    pub degraded: bool,
    pub download_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_terminal_sets() {
        assert!(JobStatus::Queued.is_busy());
        assert!(JobStatus::Running.is_busy());
        assert!(!JobStatus::Idle.is_busy());
        assert!(!JobStatus::Done.is_busy());

        for status in [JobStatus::Done, JobStatus::Error, JobStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(!status.is_busy());
        }
        assert!(!JobStatus::Idle.is_terminal());
    }

    #[test]
    fn status_parses_wire_values() {
        assert_eq!("running".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert_eq!("cancelled".parse::<JobStatus>().unwrap(), JobStatus::Cancelled);
        assert!("skipped".parse::<JobStatus>().is_err());
    }

    #[test]
    fn quality_parses_and_displays() {
        assert_eq!("high".parse::<Quality>().unwrap(), Quality::High);
        assert_eq!(Quality::Fast.to_string(), "fast");
        let err = "ultra".parse::<Quality>().unwrap_err();
        assert!(err.to_string().contains("ultra"));
    }

    #[test]
    fn image_payload_debug_hides_bytes() {
        let payload = ImagePayload::from(vec![1, 2, 3]);
        assert_eq!(format!("{payload:?}"), "ImagePayload(3 bytes)");
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn request_builder_defaults_to_normal_quality() {
        let request = GenerationRequest::new(ImagePayload::from(vec![0]));
        assert_eq!(request.quality, Quality::Normal);
        assert!(request.seed.is_none());
        assert!(request.canvas.is_none());
    }
}
