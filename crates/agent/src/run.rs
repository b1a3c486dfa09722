//! Drive one generation through a [`GenerationClient`] to its end.

use anyhow::bail;
use sketchflow_client::runtime::GenerationClient;
use sketchflow_core::machine::JobSnapshot;
use sketchflow_core::types::{GenerationRequest, JobStatus};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done {
        result_url: String,
        seed: Option<u64>,
        download_url: Option<String>,
    },
    /// The server declined the sketch as blank.
    Skipped,
    Failed(String),
    Cancelled,
}

/// `true` once nothing is in flight or queued up.
pub fn is_settled(snapshot: &JobSnapshot) -> bool {
    !snapshot.dispatching && !snapshot.is_busy() && !snapshot.has_pending
}

/// Submit `request` and wait until the job ends.
///
/// Fails if the session is rejected, or if the client stops first.
pub async fn run_once(
    client: &GenerationClient,
    request: GenerationRequest,
) -> anyhow::Result<Outcome> {
    let handle = client.handle();
    let submitted = handle.snapshot().submissions + 1;

    if !client.submit(request) {
        bail!("job controller is not running");
    }

    let Some(snapshot) = handle
        .wait_for(|s| s.submissions >= submitted && is_settled(s))
        .await
    else {
        bail!("job controller stopped");
    };
    if snapshot.signed_out {
        bail!("session is not authorized, sign in again");
    }

    Ok(match snapshot.status {
        JobStatus::Done => {
            let download_url = client.actions().download_current().map(String::from);
            match snapshot.current {
                Some(item) => Outcome::Done {
                    result_url: item.url,
                    seed: item.seed,
                    download_url,
                },
                None => Outcome::Failed("result missing from history".into()),
            }
        }
        JobStatus::Error => Outcome::Failed(snapshot.message.unwrap_or_default()),
        JobStatus::Cancelled => Outcome::Cancelled,
        JobStatus::Idle | JobStatus::Queued | JobStatus::Running => Outcome::Skipped,
    })
}
