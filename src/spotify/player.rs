use async_trait::async_trait;
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{CONTENT_LENGTH, RETRY_AFTER},
};

use crate::{
    config::Config,
    error::ApiError,
    types::{ApiErrorBody, Device, DevicesResponse, PlaybackSnapshot, RepeatState},
    utils,
};

/// Playback calls the backend issues against the remote service.
///
/// Every method is exactly one request. `device_id: None` lets the server
/// pick the active device. Retrying is left to the caller.
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    async fn get_devices(&self, token: &str) -> Result<Vec<Device>, ApiError>;

    /// `None` when nothing is playing on any device.
    async fn get_current_playback(&self, token: &str) -> Result<Option<PlaybackSnapshot>, ApiError>;

    async fn play(&self, token: &str, device_id: Option<&str>) -> Result<(), ApiError>;

    async fn pause(&self, token: &str, device_id: Option<&str>) -> Result<(), ApiError>;

    async fn next(&self, token: &str, device_id: Option<&str>) -> Result<(), ApiError>;

    async fn previous(&self, token: &str, device_id: Option<&str>) -> Result<(), ApiError>;

    async fn seek(&self, token: &str, position_ms: u64, device_id: Option<&str>) -> Result<(), ApiError>;

    async fn set_volume(&self, token: &str, volume_percent: u8, device_id: Option<&str>) -> Result<(), ApiError>;

    async fn set_shuffle(&self, token: &str, state: bool, device_id: Option<&str>) -> Result<(), ApiError>;

    async fn set_repeat(&self, token: &str, mode: RepeatState, device_id: Option<&str>) -> Result<(), ApiError>;
}

/// Spotify Web API implementation of [`PlaybackApi`].
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    api_url: String,
}

impl SpotifyClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_url.clone())
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(token)
    }

    async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        check_status(response).await
    }

    /// Player commands carry their arguments in the query string and an
    /// empty body.
    async fn command(
        &self,
        method: Method,
        path: &str,
        token: &str,
        mut query: Vec<(&str, String)>,
        device_id: Option<&str>,
    ) -> Result<(), ApiError> {
        if let Some(id) = device_id {
            query.push(("device_id", id.to_string()));
        }
        let request = self
            .request(method, path, token)
            .query(&query)
            .header(CONTENT_LENGTH, 0);
        match Self::send(request).await {
            Ok(_) => Ok(()),
            // Player restrictions (no Premium, disallowed action) come back
            // as 403 although the token is fine.
            Err(ApiError::Auth { status, message }) if status == StatusCode::FORBIDDEN.as_u16() => {
                Err(ApiError::Remote { status, message })
            }
            Err(e) => Err(e),
        }
    }
}

/// Sorts a non-success response into auth, rate limit or remote errors.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(utils::parse_retry_after);
        return Err(ApiError::RateLimited(retry_after));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Auth {
            status: status.as_u16(),
            message,
        }),
        _ => Err(ApiError::Remote {
            status: status.as_u16(),
            message,
        }),
    }
}

#[async_trait]
impl PlaybackApi for SpotifyClient {
    async fn get_devices(&self, token: &str) -> Result<Vec<Device>, ApiError> {
        let response = Self::send(self.request(Method::GET, "/me/player/devices", token)).await?;
        let devices = response.json::<DevicesResponse>().await?;
        Ok(devices.devices)
    }

    async fn get_current_playback(&self, token: &str) -> Result<Option<PlaybackSnapshot>, ApiError> {
        let response = Self::send(self.request(Method::GET, "/me/player", token)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body).map(Some).map_err(|e| ApiError::Remote {
            status: StatusCode::OK.as_u16(),
            message: format!("malformed playback state: {e}"),
        })
    }

    async fn play(&self, token: &str, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command(Method::PUT, "/me/player/play", token, Vec::new(), device_id)
            .await
    }

    async fn pause(&self, token: &str, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command(Method::PUT, "/me/player/pause", token, Vec::new(), device_id)
            .await
    }

    async fn next(&self, token: &str, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command(Method::POST, "/me/player/next", token, Vec::new(), device_id)
            .await
    }

    async fn previous(&self, token: &str, device_id: Option<&str>) -> Result<(), ApiError> {
        self.command(Method::POST, "/me/player/previous", token, Vec::new(), device_id)
            .await
    }

    async fn seek(&self, token: &str, position_ms: u64, device_id: Option<&str>) -> Result<(), ApiError> {
        let query = vec![("position_ms", position_ms.to_string())];
        self.command(Method::PUT, "/me/player/seek", token, query, device_id)
            .await
    }

    async fn set_volume(&self, token: &str, volume_percent: u8, device_id: Option<&str>) -> Result<(), ApiError> {
        let query = vec![("volume_percent", volume_percent.min(100).to_string())];
        self.command(Method::PUT, "/me/player/volume", token, query, device_id)
            .await
    }

    async fn set_shuffle(&self, token: &str, state: bool, device_id: Option<&str>) -> Result<(), ApiError> {
        let query = vec![("state", state.to_string())];
        self.command(Method::PUT, "/me/player/shuffle", token, query, device_id)
            .await
    }

    async fn set_repeat(&self, token: &str, mode: RepeatState, device_id: Option<&str>) -> Result<(), ApiError> {
        let query = vec![("state", mode.as_str().to_string())];
        self.command(Method::PUT, "/me/player/repeat", token, query, device_id)
            .await
    }
}
