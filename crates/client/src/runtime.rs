//! Wiring of the client's background tasks.
//!
//! [`GenerationClient::start`] creates the controller, the push channel,
//! the poll fallback and the capture debouncer, all under one master
//! [`CancellationToken`]. Call [`GenerationClient::shutdown`] to stop them.

use std::sync::Arc;
use std::time::Duration;

use sketchflow_core::machine::JobMachine;
use sketchflow_core::types::{BaseImage, GenerationRequest};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::Actions;
use crate::api::{GenerationApi, HttpGenerationApi};
use crate::channel::PushChannel;
use crate::client::PushClient;
use crate::config::{ClientConfig, ConfigError};
use crate::controller::{JobController, JobHandle};
use crate::debounce::{CaptureDebouncer, Debouncer};
use crate::origin::Origin;
use crate::poller::StatusPoller;
use crate::reconnect::ReconnectConfig;
use crate::session::SessionProvider;

/// How long shutdown waits for each task.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running client session.
pub struct GenerationClient {
    handle: JobHandle,
    actions: Actions,
    capture: CaptureDebouncer,
    channel: PushChannel,
    ui_language: Option<String>,
    tasks: Vec<JoinHandle<()>>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

impl GenerationClient {
    /// Start a client against the HTTP backend described by `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: &ClientConfig,
        session: Arc<dyn SessionProvider>,
        base_image: Option<BaseImage>,
    ) -> Result<Self, ConfigError> {
        let api = Arc::new(HttpGenerationApi::new(
            config.api_url.clone(),
            Arc::clone(&session),
        ));
        Self::start_with_api(config, api, session, base_image)
    }

    /// Same as [`start`](Self::start) with a caller-supplied API.
    pub fn start_with_api(
        config: &ClientConfig,
        api: Arc<dyn GenerationApi>,
        session: Arc<dyn SessionProvider>,
        base_image: Option<BaseImage>,
    ) -> Result<Self, ConfigError> {
        let origin = Origin::parse(&config.public_origin)?;
        let cancel = CancellationToken::new();

        let machine = match base_image {
            Some(base_image) => JobMachine::with_base_image(base_image),
            None => JobMachine::new(),
        };
        let (handle, controller_task) = JobController::spawn(
            Arc::clone(&api),
            machine,
            origin.clone(),
            cancel.child_token(),
        );

        let channel = PushChannel::spawn(
            PushClient::new(config.ws_url.clone()),
            session,
            handle.clone(),
            origin.clone(),
            ReconnectConfig::fixed(config.reconnect_delay),
            cancel.child_token(),
        );

        let poller = StatusPoller::new(api, handle.clone(), origin.clone(), channel.connected())
            .with_interval(config.poll_interval);
        let poll_cancel = cancel.child_token();
        let poller_task = tokio::spawn(async move { poller.run(poll_cancel).await });

        let submit_handle = handle.clone();
        let capture = Debouncer::spawn(
            config.debounce_window,
            move |request: GenerationRequest| {
                submit_handle.submit(request);
            },
            cancel.child_token(),
        );

        tracing::info!(
            api_url = %config.api_url,
            ws_url = %config.ws_url,
            "Generation client started",
        );

        Ok(Self {
            actions: Actions::new(handle.clone(), origin),
            handle,
            capture,
            channel,
            ui_language: config.ui_language.clone(),
            tasks: vec![controller_task, poller_task],
            cancel,
        })
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    pub fn is_channel_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Offer a canvas snapshot to the debounce stage.
    pub fn capture(&self, request: GenerationRequest) -> bool {
        self.capture.capture(self.localize(request))
    }

    /// Submit immediately, bypassing the debounce stage.
    pub fn submit(&self, request: GenerationRequest) -> bool {
        self.handle.submit(self.localize(request))
    }

    pub fn set_base_image(&self, base_image: BaseImage) -> bool {
        self.handle.set_base_image(base_image)
    }

    /// Stop every background task. A capture still waiting in the
    /// debounce window is discarded.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down generation client");
        self.cancel.cancel();

        self.capture.close().await;
        self.channel.join().await;
        for task in self.tasks {
            let _ = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, task).await;
        }

        tracing::info!("Generation client shut down complete");
    }

    fn localize(&self, request: GenerationRequest) -> GenerationRequest {
        match (&request.ui_language, &self.ui_language) {
            (None, Some(language)) => request.with_ui_language(language.clone()),
            _ => request,
        }
    }
}
