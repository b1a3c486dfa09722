use std::time::Duration;

/// Default REST base URL.
const DEFAULT_API_URL: &str = "http://localhost:8000/api";
/// Default push-channel endpoint.
const DEFAULT_WS_URL: &str = "ws://localhost:8000/api/ws";
/// Default origin used to absolutize result addresses.
const DEFAULT_PUBLIC_ORIGIN: &str = "http://localhost:8000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;
const DEFAULT_DEBOUNCE_MS: u64 = 350;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL, including the `/api` prefix.
    pub api_url: String,
    /// Push-channel endpoint; the session id is appended as `?sid=`.
    pub ws_url: String,
    /// Origin that relative result URLs are resolved against.
    pub public_origin: String,
    /// Interval of the status-poll fallback.
    pub poll_interval: Duration,
    /// Fixed delay before reconnecting a dropped push channel.
    pub reconnect_delay: Duration,
    /// Quiet window of the capture debounce stage.
    pub debounce_window: Duration,
    /// Locale sent with prompts so the server can normalize them.
    pub ui_language: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            ws_url: DEFAULT_WS_URL.into(),
            public_origin: DEFAULT_PUBLIC_ORIGIN.into(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            debounce_window: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            ui_language: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                      |
    /// |---------------------------------|------------------------------|
    /// | `SKETCHFLOW_API_URL`            | `http://localhost:8000/api`  |
    /// | `SKETCHFLOW_WS_URL`             | `ws://localhost:8000/api/ws` |
    /// | `SKETCHFLOW_PUBLIC_ORIGIN`      | `http://localhost:8000`      |
    /// | `SKETCHFLOW_POLL_INTERVAL_MS`   | `1500`                       |
    /// | `SKETCHFLOW_RECONNECT_DELAY_MS` | `2000`                       |
    /// | `SKETCHFLOW_DEBOUNCE_MS`        | `350`                        |
    /// | `SKETCHFLOW_UI_LANGUAGE`        | unset                        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through
    /// `lookup`, so tests do not have to touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        Ok(Self {
            api_url: text("SKETCHFLOW_API_URL", defaults.api_url)
                .trim_end_matches('/')
                .to_string(),
            ws_url: text("SKETCHFLOW_WS_URL", defaults.ws_url),
            public_origin: text("SKETCHFLOW_PUBLIC_ORIGIN", defaults.public_origin),
            poll_interval: millis(
                &lookup,
                "SKETCHFLOW_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?,
            reconnect_delay: millis(
                &lookup,
                "SKETCHFLOW_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            )?,
            debounce_window: millis(&lookup, "SKETCHFLOW_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?,
            ui_language: lookup("SKETCHFLOW_UI_LANGUAGE").filter(|v| !v.trim().is_empty()),
        })
    }
}

fn millis<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(Duration::from_millis(default)),
        Some(raw) => {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: "expected a whole number of milliseconds".into(),
            })?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: raw,
                    reason: "must be greater than zero".into(),
                });
            }
            Ok(Duration::from_millis(ms))
        }
    }
}

/// Errors raised while loading [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key} ({value:?}): {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
