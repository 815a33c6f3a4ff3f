#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{Form, Json, Router, extract::State, http::StatusCode, routing::post};
use chrono::Utc;
use serde_json::{Value, json};
use spotdeck::{
    backend::Backend,
    config::{Config, REQUIRED_SCOPES},
    error::ApiError,
    management::TokenStore,
    spotify::{auth::UrlOpener, player::PlaybackApi},
    types::{Credentials, Device, PlaybackSnapshot, RepeatState, Token},
};

pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::with_data_dir(dir);
    config.tick_interval = Duration::from_millis(50);
    config.activity_window = Duration::from_secs(5);
    config.default_retry_after = Duration::from_secs(1);
    config.auth_timeout = Duration::from_secs(2);
    // Nothing listens here, so refreshes fail fast.
    config.token_url = "http://127.0.0.1:9/api/token".to_string();
    config
}

pub fn valid_token() -> Token {
    Token {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        expires_at: Utc::now().timestamp() + 3600,
        scope: REQUIRED_SCOPES.join(" "),
    }
}

pub fn device(id: &str, active: bool, volume: Option<u8>) -> Device {
    Device {
        id: Some(id.to_string()),
        name: format!("{id} speaker"),
        is_active: active,
        supports_volume: volume.is_some(),
        volume_percent: volume,
    }
}

pub fn playback(is_playing: bool, repeat_state: RepeatState) -> PlaybackSnapshot {
    PlaybackSnapshot {
        is_playing,
        shuffle_state: false,
        repeat_state,
        device: None,
        progress_ms: Some(1000),
        item: None,
    }
}

/// In-memory [`PlaybackApi`] recording every call.
#[derive(Default)]
pub struct FakeApi {
    pub calls: Mutex<Vec<String>>,
    pub playback: Mutex<Option<PlaybackSnapshot>>,
    pub devices: Mutex<Vec<Device>>,
    /// Errors returned by the next playback queries, in order.
    pub failures: Mutex<VecDeque<ApiError>>,
    /// Errors returned by the next player commands, in order.
    pub command_failures: Mutex<VecDeque<ApiError>>,
}

impl FakeApi {
    pub fn with_state(playback: Option<PlaybackSnapshot>, devices: Vec<Device>) -> Arc<Self> {
        let api = Self::default();
        *api.playback.lock().unwrap() = playback;
        *api.devices.lock().unwrap() = devices;
        Arc::new(api)
    }

    pub fn fail_next(&self, err: ApiError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_command(&self, err: ApiError) {
        self.command_failures.lock().unwrap().push_back(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn command(&self, name: &str, device_id: Option<&str>) -> Result<(), ApiError> {
        self.record(format!("{name}:{}", device_id.unwrap_or("-")));
        match self.command_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlaybackApi for FakeApi {
    async fn get_devices(&self, _token: &str) -> Result<Vec<Device>, ApiError> {
        self.record("get_devices".to_string());
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn get_current_playback(&self, _token: &str) -> Result<Option<PlaybackSnapshot>, ApiError> {
        self.record("get_current_playback".to_string());
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.playback.lock().unwrap().clone())
    }

    async fn play(&self, _token: &str, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command("play", device_id)
    }

    async fn pause(&self, _token: &str, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command("pause", device_id)
    }

    async fn next(&self, _token: &str, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command("next", device_id)
    }

    async fn previous(&self, _token: &str, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command("previous", device_id)
    }

    async fn seek(&self, _token: &str, position_ms: u64, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command(&format!("seek({position_ms})"), device_id)
    }

    async fn set_volume(&self, _token: &str, volume_percent: u8, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command(&format!("volume({volume_percent})"), device_id)
    }

    async fn set_shuffle(&self, _token: &str, state: bool, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command(&format!("shuffle({state})"), device_id)
    }

    async fn set_repeat(&self, _token: &str, mode: RepeatState, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command(&format!("repeat({mode})"), device_id)
    }
}

/// Opener that only remembers which URLs it was asked to show.
#[derive(Default)]
pub struct RecordingOpener {
    pub urls: Mutex<Vec<String>>,
}

impl RecordingOpener {
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl UrlOpener for RecordingOpener {
    fn open(&self, url: &str) -> Result<(), String> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub fn build_backend(
    config: Config,
    api: Arc<FakeApi>,
    opener: Arc<dyn UrlOpener>,
) -> Arc<Backend> {
    let store = TokenStore::from_config(&config);
    Arc::new(Backend::new(config, store, api, opener))
}

pub fn credentials(port: u16) -> Credentials {
    Credentials::new("abc", &port.to_string()).unwrap()
}

/// A loopback port nothing listens on right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn port_is_free(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Waits until `check` holds, polling every 20ms for at most `limit`.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Token endpoint stand-in recording every form it receives.
#[derive(Clone, Default)]
pub struct TokenEndpoint {
    forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
    reject: bool,
}

impl TokenEndpoint {
    pub fn forms(&self) -> Vec<HashMap<String, String>> {
        self.forms.lock().unwrap().clone()
    }
}

async fn token(
    State(endpoint): State<TokenEndpoint>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    endpoint.forms.lock().unwrap().push(form);
    if endpoint.reject {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "Invalid authorization code" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "access_token": "fresh-access",
            "token_type": "Bearer",
            "scope": REQUIRED_SCOPES.join(" "),
            "expires_in": 3600,
            "refresh_token": "fresh-refresh",
        })),
    )
}

/// Serves the token endpoint on an ephemeral port and points `config` at it.
/// With `reject` every grant is answered with `400 invalid_grant`.
pub async fn mock_token_server(config: &mut Config, reject: bool) -> TokenEndpoint {
    let endpoint = TokenEndpoint {
        reject,
        ..Default::default()
    };
    let app = Router::new()
        .route("/api/token", post(token))
        .with_state(endpoint.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    config.token_url = format!("http://{}/api/token", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    endpoint
}
