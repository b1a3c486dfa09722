//! Outbound signals for the collaborators around the client.
//!
//! The job controller and the push channel publish these on a
//! [`tokio::sync::broadcast`] channel; the login flow, the canvas and the
//! display surface each pick the variants they care about.

use reqwest::Url;
use serde::Serialize;
use sketchflow_core::types::{JobId, Quality};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The push channel connection was established.
    ChannelConnected,

    /// The push channel connection was lost.
    ChannelDisconnected,

    /// The session is no longer valid; hand control to the login flow.
    RedirectToLogin,

    /// A result was applied as the new base image; the canvas should
    /// clear its sketch layer.
    ClearSketchLayer,

    /// Open this address out-of-band (a download).
    OpenDownload {
        #[serde(serialize_with = "serialize_url")]
        url: Url,
    },

    /// The server is producing this job at a lower tier than requested.
    QualityDegraded {
        job_id: JobId,
        requested: Quality,
        effective: Quality,
    },
}

fn serialize_url<S: serde::Serializer>(url: &Url, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(url.as_str())
}
