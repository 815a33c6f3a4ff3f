use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::error::Error;

/// OAuth token set as persisted in the token cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) after which the access token is rejected.
    pub expires_at: i64,
    /// Space separated list of granted scopes.
    pub scope: String,
}

impl Token {
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }
}

/// PKCE material for a single authorization attempt.
#[derive(Debug, Clone)]
pub struct PkceToken {
    pub code_verifier: String,
    pub state: String,
}

/// Client credentials entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub redirect_port: u16,
}

impl Credentials {
    /// Validates raw settings input. The port arrives as text from the
    /// settings layer, so parsing is part of validation.
    pub fn new(client_id: &str, port: &str) -> Result<Self, Error> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(Error::InvalidCredentials("client id is empty".into()));
        }

        let port = port.trim();
        if port.is_empty() {
            return Err(Error::InvalidCredentials("redirect port is empty".into()));
        }
        let redirect_port = port
            .parse::<u16>()
            .map_err(|_| Error::InvalidCredentials(format!("invalid redirect port {port:?}")))?;
        if redirect_port == 0 {
            return Err(Error::InvalidCredentials("redirect port must not be 0".into()));
        }

        Ok(Self {
            client_id: client_id.to_string(),
            redirect_port,
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}", self.redirect_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatState {
    Off,
    Track,
    Context,
}

impl RepeatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatState::Off => "off",
            RepeatState::Track => "track",
            RepeatState::Context => "context",
        }
    }

    /// Order used by the repeat button: off, context, track, off.
    pub fn cycle(self) -> Self {
        match self {
            RepeatState::Off => RepeatState::Context,
            RepeatState::Context => RepeatState::Track,
            RepeatState::Track => RepeatState::Off,
        }
    }
}

impl fmt::Display for RepeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatState::Off),
            "track" => Ok(RepeatState::Track),
            "context" => Ok(RepeatState::Context),
            other => Err(Error::InvalidRepeatMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Restricted devices may come without an id.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub supports_volume: bool,
    #[serde(default)]
    pub volume_percent: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

/// Currently playing item, reduced to what a button label needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackItem {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl TrackItem {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Body of `GET /me/player`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub shuffle_state: bool,
    pub repeat_state: RepeatState,
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub item: Option<TrackItem>,
}

#[derive(Tabled)]
pub struct DeviceTableRow {
    pub active: String,
    pub name: String,
    pub id: String,
    pub volume: String,
}

impl From<&Device> for DeviceTableRow {
    fn from(device: &Device) -> Self {
        Self {
            active: if device.is_active { "*".into() } else { String::new() },
            name: device.name.clone(),
            id: device.id.clone().unwrap_or_default(),
            volume: match (device.supports_volume, device.volume_percent) {
                (true, Some(v)) => format!("{v}%"),
                _ => "-".into(),
            },
        }
    }
}

/// Token endpoint response for both the code exchange and the refresh grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: String,
}
