//! Push-channel manager.
//!
//! [`PushChannel`] owns the single logical push connection of a client
//! session: connect, process frames, reconnect after any closure that
//! teardown did not ask for. Whenever a connection is up and the
//! controller has an active job, the job is subscribed exactly once per
//! connection. Every parsed frame is forwarded to the controller as an
//! [`Input`](sketchflow_core::machine::Input); malformed frames are logged
//! and dropped.
//!
//! The connected flag is published on a `watch` channel so the poll
//! fallback can stand down while the channel is live.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use sketchflow_core::types::JobId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, PushClient, PushConnection, PushStream};
use crate::controller::JobHandle;
use crate::events::ClientEvent;
use crate::messages::{parse_message, SubscribeRequest};
use crate::origin::Origin;
use crate::reconnect::{reconnect_loop, ReconnectConfig};
use crate::session::SessionProvider;

/// How long [`PushChannel::join`] waits for the task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type PushSink = SplitSink<PushStream, Message>;

/// Handle to the running push-channel task.
pub struct PushChannel {
    connected: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl PushChannel {
    /// Spawn the connection task. It runs until `cancel` is triggered.
    pub fn spawn(
        client: PushClient,
        session: Arc<dyn SessionProvider>,
        handle: JobHandle,
        origin: Origin,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (connected_tx, connected) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::info!(ws_url = %client.ws_url(), "Starting push channel");
            run_connection_loop(
                &client,
                session.as_ref(),
                &handle,
                &origin,
                &reconnect,
                &connected_tx,
                &cancel,
            )
            .await;
            tracing::info!("Push channel exited");
        });

        Self { connected, task }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// A receiver for the connected flag.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Wait for the task to exit after its token was cancelled.
    pub async fn join(self) {
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task).await;
    }
}

/// Core connection loop: connect -> process frames -> reconnect.
///
/// Runs until the cancellation token is triggered.
async fn run_connection_loop(
    client: &PushClient,
    session: &dyn SessionProvider,
    handle: &JobHandle,
    origin: &Origin,
    reconnect: &ReconnectConfig,
    connected_tx: &watch::Sender<bool>,
    cancel: &CancellationToken,
) {
    let first = tokio::select! {
        _ = cancel.cancelled() => return,
        result = client.connect(session.session_id()) => result,
    };
    let mut conn = match first {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "Connection failed, entering reconnect loop");
            match reconnect_loop(client, session, reconnect, cancel).await {
                Some(conn) => conn,
                None => return,
            }
        }
    };

    loop {
        connected_tx.send_replace(true);
        handle.emit(ClientEvent::ChannelConnected);

        run_session(conn, handle, origin, cancel).await;

        connected_tx.send_replace(false);
        handle.emit(ClientEvent::ChannelDisconnected);

        if cancel.is_cancelled() {
            return;
        }

        tracing::info!("Push channel lost, entering reconnect loop");
        conn = match reconnect_loop(client, session, reconnect, cancel).await {
            Some(conn) => conn,
            None => return,
        };
    }
}

/// Process one connection until it closes, fails, or `cancel` fires.
async fn run_session(
    conn: PushConnection,
    handle: &JobHandle,
    origin: &Origin,
    cancel: &CancellationToken,
) {
    let sid = conn.sid;
    let (mut sink, mut stream) = conn.ws_stream.split();
    let mut snapshots = handle.snapshots();
    let mut last_subscribed: Option<JobId> = None;

    let active = snapshots.borrow_and_update().active_job.clone();
    if let Err(e) = subscribe(&mut sink, active, sid.as_deref(), &mut last_subscribed).await {
        tracing::warn!(error = %e, "Subscribe failed, closing push channel");
        return;
    }

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    // The controller is gone.
                    return;
                }
                let active = snapshots.borrow_and_update().active_job.clone();
                if let Err(e) = subscribe(&mut sink, active, sid.as_deref(), &mut last_subscribed).await {
                    tracing::warn!(error = %e, "Subscribe failed, closing push channel");
                    return;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_text_message(&text, handle, origin),
                Some(Ok(Message::Binary(_))) => {
                    tracing::trace!("Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Push channel closed by server");
                    return;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Push channel receive error");
                    return;
                }
                None => return,
            },
        }
    }
}

/// Send a subscribe frame for `active` unless this connection already
/// subscribed to it.
async fn subscribe(
    sink: &mut PushSink,
    active: Option<JobId>,
    sid: Option<&str>,
    last_subscribed: &mut Option<JobId>,
) -> Result<(), ClientError> {
    let Some(job_id) = active else {
        return Ok(());
    };
    if last_subscribed.as_deref() == Some(job_id.as_str()) {
        return Ok(());
    }

    let frame = SubscribeRequest::new(&job_id, sid).to_json();
    sink.send(Message::Text(frame))
        .await
        .map_err(|e| ClientError::Protocol(e.to_string()))?;

    tracing::debug!(job_id = %job_id, "Subscribed to job");
    *last_subscribed = Some(job_id);
    Ok(())
}

/// Parse a text frame and forward it to the controller.
fn handle_text_message(text: &str, handle: &JobHandle, origin: &Origin) {
    match parse_message(text) {
        Ok(msg) => {
            tracing::debug!(job_id = msg.job_id().unwrap_or("-"), ?msg, "Push frame");
            if let Some(input) = msg.into_input(origin) {
                handle.send(input);
            }
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                raw_message = %text,
                "Failed to parse push frame",
            );
        }
    }
}
