//! What the agent submits, read from the environment.

use std::path::PathBuf;

use anyhow::{bail, Context};
use sketchflow_core::types::{BaseImage, GenerationRequest, ImagePayload, Quality};

/// One generation to run.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub session_id: Option<String>,
    pub base_image_id: String,
    pub sketch_path: PathBuf,
    pub canvas_path: Option<PathBuf>,
    pub prompt: String,
    pub quality: Quality,
    pub seed: Option<u64>,
}

impl AgentSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(base_image_id) = non_empty("SKETCHFLOW_BASE_IMAGE_ID") else {
            bail!("SKETCHFLOW_BASE_IMAGE_ID environment variable is required");
        };
        let Some(sketch_path) = non_empty("SKETCHFLOW_SKETCH_PATH") else {
            bail!("SKETCHFLOW_SKETCH_PATH environment variable is required");
        };

        let quality = match non_empty("SKETCHFLOW_QUALITY") {
            Some(raw) => raw
                .parse::<Quality>()
                .context("SKETCHFLOW_QUALITY must be fast, normal or high")?,
            None => Quality::Normal,
        };
        let seed = non_empty("SKETCHFLOW_SEED")
            .map(|raw| raw.parse::<u64>())
            .transpose()
            .context("SKETCHFLOW_SEED must be a non-negative integer")?;

        if quality == Quality::High && seed.is_none() {
            bail!("SKETCHFLOW_QUALITY=high needs SKETCHFLOW_SEED from an earlier result");
        }

        Ok(Self {
            session_id: non_empty("SKETCHFLOW_SESSION_ID"),
            base_image_id,
            sketch_path: sketch_path.into(),
            canvas_path: non_empty("SKETCHFLOW_CANVAS_PATH").map(PathBuf::from),
            prompt: lookup("SKETCHFLOW_PROMPT").unwrap_or_default(),
            quality,
            seed,
        })
    }

    pub fn base_image(&self) -> BaseImage {
        BaseImage::new(self.base_image_id.clone())
    }

    /// Read the PNG files and build the request.
    pub async fn load_request(&self) -> anyhow::Result<GenerationRequest> {
        let sketch = tokio::fs::read(&self.sketch_path)
            .await
            .with_context(|| format!("reading sketch {}", self.sketch_path.display()))?;

        let mut request = GenerationRequest::new(ImagePayload::from(sketch))
            .with_prompt(self.prompt.clone())
            .with_quality(self.quality)
            .with_seed(self.seed);

        if let Some(path) = &self.canvas_path {
            let canvas = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading canvas {}", path.display()))?;
            request = request.with_canvas(ImagePayload::from(canvas));
        }
        Ok(request)
    }
}
