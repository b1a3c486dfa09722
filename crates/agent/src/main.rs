//! `sketchflow-agent` -- headless generation client.
//!
//! Submits one sketch from disk to the generation backend, follows the
//! job over the push channel (falling back to polling) and prints the
//! result and download addresses.
//!
//! # Environment variables
//!
//! | Variable                   | Required | Default  | Description                              |
//! |----------------------------|----------|----------|------------------------------------------|
//! | `SKETCHFLOW_BASE_IMAGE_ID` | yes      | --       | Base image the sketch is drawn on        |
//! | `SKETCHFLOW_SKETCH_PATH`   | yes      | --       | PNG of the sketch layer                  |
//! | `SKETCHFLOW_CANVAS_PATH`   | no       | --       | PNG of the composited canvas             |
//! | `SKETCHFLOW_PROMPT`        | no       | empty    | Prompt text                              |
//! | `SKETCHFLOW_QUALITY`       | no       | `normal` | `fast`, `normal` or `high`               |
//! | `SKETCHFLOW_SEED`          | no       | --       | Seed to reuse; required with `high`      |
//! | `SKETCHFLOW_SESSION_ID`    | no       | --       | Session id sent as cookie and `?sid=`    |
//!
//! Connection settings are read by
//! [`ClientConfig::from_env`](sketchflow_client::config::ClientConfig::from_env).

use std::process::ExitCode;
use std::sync::Arc;

use sketchflow_agent::run::{run_once, Outcome};
use sketchflow_agent::settings::AgentSettings;
use sketchflow_client::config::ClientConfig;
use sketchflow_client::runtime::GenerationClient;
use sketchflow_client::session::StaticSession;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketchflow_agent=info,sketchflow_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env()?;
    let settings = AgentSettings::from_env()?;
    let request = settings.load_request().await?;

    tracing::info!(
        base_image_id = %settings.base_image_id,
        quality = %settings.quality,
        api_url = %config.api_url,
        "Starting sketchflow-agent",
    );

    let session = Arc::new(StaticSession::new(settings.session_id.clone()));
    let client = GenerationClient::start(&config, session, Some(settings.base_image()))?;

    let outcome = tokio::select! {
        outcome = run_once(&client, request) => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    client.shutdown().await;

    let Some(outcome) = outcome else {
        tracing::info!("Interrupted");
        return Ok(ExitCode::FAILURE);
    };

    match outcome? {
        Outcome::Done {
            result_url,
            seed,
            download_url,
        } => {
            println!("result: {result_url}");
            if let Some(seed) = seed {
                println!("seed: {seed}");
            }
            if let Some(url) = download_url {
                println!("download: {url}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Skipped => {
            println!("skipped: the sketch is blank");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Cancelled => {
            println!("cancelled");
            Ok(ExitCode::FAILURE)
        }
        Outcome::Failed(message) => {
            eprintln!("error: {message}");
            Ok(ExitCode::FAILURE)
        }
    }
}
