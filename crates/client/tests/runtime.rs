//! End-to-end wiring: debouncer, controller and poll fallback together,
//! with the push endpoint unreachable.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, request, status, FakeApi, ORIGIN, WAIT};
use sketchflow_client::config::{ClientConfig, ConfigError};
use sketchflow_client::runtime::GenerationClient;
use sketchflow_client::session::StaticSession;
use sketchflow_core::types::{BaseImage, JobStatus};

fn config() -> ClientConfig {
    ClientConfig {
        api_url: "http://127.0.0.1:1/api".into(),
        ws_url: "ws://127.0.0.1:1/api/ws".into(),
        public_origin: ORIGIN.into(),
        poll_interval: Duration::from_millis(20),
        reconnect_delay: Duration::from_millis(50),
        debounce_window: Duration::from_millis(40),
        ui_language: Some("de".into()),
    }
}

fn start(api: Arc<FakeApi>) -> GenerationClient {
    GenerationClient::start_with_api(
        &config(),
        api,
        Arc::new(StaticSession::new(None)),
        Some(BaseImage::new("img-1")),
    )
    .unwrap()
}

#[tokio::test]
async fn capture_burst_runs_latest_to_done_by_polling() {
    let api = FakeApi::new();
    let mut done = status("job-1", JobStatus::Done);
    done.result_url = Some("/r/9.png".into());
    done.seed = Some(9);
    api.script_status(Ok(done));

    let client = start(api.clone());
    assert!(!client.is_channel_connected());

    client.capture(request(1));
    client.capture(request(2));
    client.capture(request(3));

    let snapshot = tokio::time::timeout(
        WAIT,
        client.handle().wait_for(|s| s.status == JobStatus::Done),
    )
    .await
    .expect("timed out waiting for done")
    .expect("controller stopped");

    let creates = api.creates();
    assert_eq!(creates.len(), 1, "burst must collapse to one submit");
    assert_eq!(creates[0].prompt, "prompt 3");
    assert_eq!(creates[0].ui_language.as_deref(), Some("de"));

    let current = snapshot.current.expect("current result");
    assert_eq!(current.url, "http://localhost:8000/r/9.png");
    assert_eq!(current.seed, Some(9));

    client.shutdown().await;
}

#[tokio::test]
async fn explicit_language_is_kept() {
    let api = FakeApi::new();
    let client = start(api.clone());

    client.submit(request(1).with_ui_language("fr"));
    eventually("create call", || api.creates().len() == 1).await;
    assert_eq!(api.creates()[0].ui_language.as_deref(), Some("fr"));

    client.shutdown().await;
}

#[tokio::test]
async fn invalid_origin_is_rejected() {
    let config = ClientConfig {
        public_origin: "not a url".into(),
        ..config()
    };
    let result = GenerationClient::start_with_api(
        &config,
        FakeApi::new(),
        Arc::new(StaticSession::new(None)),
        None,
    );
    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}
