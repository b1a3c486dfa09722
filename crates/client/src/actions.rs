//! User-facing actions on the result display.
//!
//! Thin façade over [`JobHandle`]: every action is an input to the
//! controller, except `download_current`, which only composes an address.

use reqwest::Url;
use sketchflow_core::machine::Input;

use crate::controller::JobHandle;
use crate::events::ClientEvent;
use crate::origin::Origin;

#[derive(Clone)]
pub struct Actions {
    handle: JobHandle,
    origin: Origin,
}

impl Actions {
    pub fn new(handle: JobHandle, origin: Origin) -> Self {
        Self { handle, origin }
    }

    /// Replay the last request at normal quality with a fresh seed.
    pub fn regenerate(&self) -> bool {
        self.handle.send(Input::Regenerate)
    }

    /// Replay the last request at high quality with the current result's
    /// seed. Does nothing when the current result has no seed.
    pub fn improve(&self) -> bool {
        self.handle.send(Input::Improve)
    }

    /// Drop the newest result on the server, then locally.
    pub fn undo(&self) -> bool {
        self.handle.send(Input::Undo)
    }

    /// Make the current result the new base image and clear the sketch.
    pub fn apply_result_to_canvas(&self) -> bool {
        self.handle.send(Input::ApplyResult)
    }

    /// Point the current selection at another history entry.
    pub fn select(&self, result_id: impl Into<String>) -> bool {
        self.handle.send(Input::Select(result_id.into()))
    }

    /// Download address of the current result, also published as
    /// [`ClientEvent::OpenDownload`]. `None` without a current result or
    /// without a download token.
    pub fn download_current(&self) -> Option<Url> {
        let current = self.handle.snapshot().current?;
        let url = self.origin.download_url(&current)?;
        tracing::debug!(result_id = %current.id, "Opening download");
        self.handle.emit(ClientEvent::OpenDownload { url: url.clone() });
        Some(url)
    }
}
