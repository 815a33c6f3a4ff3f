//! Configuration management for spotdeck.
//!
//! Two records live here:
//!
//! - [`Config`] holds endpoints, timings and the data directory. It is built
//!   once at startup from environment variables (optionally seeded from a
//!   `.env` file in the data directory) with every field defaulted.
//! - [`Settings`] holds what the user enters in the settings panel (client id
//!   and redirect port). It is versioned and persisted as JSON next to the
//!   token cache.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::Error, types::Credentials};

pub const APP_DIR: &str = "spotdeck";

pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Scopes every cached token must carry.
pub const REQUIRED_SCOPES: [&str; 4] = [
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "app-remote-control",
];

const TOKEN_FILE: &str = ".cache";
const SETTINGS_FILE: &str = "settings.json";

/// Returns the platform specific default data directory.
///
/// - Linux: `~/.local/share/spotdeck`
/// - macOS: `~/Library/Application Support/spotdeck`
/// - Windows: `%LOCALAPPDATA%/spotdeck`
pub fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Loads environment variables from `<data_dir>/.env` if that file exists.
///
/// A missing file is fine, every setting has a default.
pub async fn load_env() -> Result<(), String> {
    let dir = env::var("SPOTDECK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_data_dir());
    async_fs::create_dir_all(&dir)
        .await
        .map_err(|e| e.to_string())?;

    let path = dir.join(".env");
    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub api_url: String,
    pub auth_url: String,
    pub token_url: String,
    /// Cadence of the poller.
    pub tick_interval: Duration,
    /// How long a `set_action_active` call keeps the poller busy.
    pub activity_window: Duration,
    /// Backoff used when a 429 carries no `Retry-After`.
    pub default_retry_after: Duration,
    /// Upper bound for waiting on the browser redirect.
    pub auth_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: DEFAULT_API_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            tick_interval: Duration::from_secs(1),
            activity_window: Duration::from_secs(5),
            default_retry_after: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Builds the configuration from the process environment.
    ///
    /// Recognized variables: `SPOTDECK_DATA_DIR`, `SPOTIFY_API_URL`,
    /// `SPOTIFY_API_AUTH_URL`, `SPOTIFY_API_TOKEN_URL`, `SPOTDECK_TICK_MS`,
    /// `SPOTDECK_ACTIVITY_WINDOW_MS`, `SPOTDECK_RETRY_AFTER_MS` and
    /// `SPOTDECK_AUTH_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: env::var("SPOTDECK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            api_url: env::var("SPOTIFY_API_URL").unwrap_or(defaults.api_url),
            auth_url: env::var("SPOTIFY_API_AUTH_URL").unwrap_or(defaults.auth_url),
            token_url: env::var("SPOTIFY_API_TOKEN_URL").unwrap_or(defaults.token_url),
            tick_interval: Duration::from_millis(env_or("SPOTDECK_TICK_MS", 1000)),
            activity_window: Duration::from_millis(env_or("SPOTDECK_ACTIVITY_WINDOW_MS", 5000)),
            default_retry_after: Duration::from_millis(env_or("SPOTDECK_RETRY_AFTER_MS", 1000)),
            auth_timeout: Duration::from_secs(env_or("SPOTDECK_AUTH_TIMEOUT_SECS", 300)),
        }
    }

    /// Same defaults, rooted in another data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(format!("{APP_DIR}.log"))
    }

    pub fn scope(&self) -> String {
        REQUIRED_SCOPES.join(" ")
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring {key}={raw:?}, using {default}");
            default
        }),
        Err(_) => default,
    }
}

pub const SETTINGS_VERSION: u32 = 1;

/// User entered settings, persisted as `settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_port: Option<u16>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            client_id: None,
            redirect_port: None,
        }
    }
}

impl Settings {
    /// Loads the settings file. A missing or unreadable file yields defaults.
    pub async fn load(config: &Config) -> Self {
        let path = config.settings_path();
        let content = match async_fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => settings.upgrade(),
            Err(e) => {
                log::warn!("discarding malformed settings {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub async fn persist(&self, config: &Config) -> Result<(), Error> {
        let path = config.settings_path();
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(self)?;
        async_fs::write(path, json).await?;
        Ok(())
    }

    /// Brings records written by older versions up to date. Version 0 files
    /// predate the version field and may carry blank entries.
    fn upgrade(mut self) -> Self {
        if self.version < SETTINGS_VERSION {
            self.client_id = self.client_id.filter(|id| !id.trim().is_empty());
            self.redirect_port = self.redirect_port.filter(|port| *port != 0);
            self.version = SETTINGS_VERSION;
        }
        self
    }

    pub fn credentials(&self) -> Option<Credentials> {
        let client_id = self.client_id.as_deref()?;
        let port = self.redirect_port?;
        Credentials::new(client_id, &port.to_string()).ok()
    }

    pub fn set_credentials(&mut self, credentials: &Credentials) {
        self.client_id = Some(credentials.client_id.clone());
        self.redirect_port = Some(credentials.redirect_port);
        self.version = SETTINGS_VERSION;
    }
}
