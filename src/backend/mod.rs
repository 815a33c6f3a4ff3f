//! # Backend facade
//!
//! [`Backend`] is the one object the deck actions and the settings panel talk
//! to. It owns the token store, the remote client, the authorization flow and
//! the state cache, and is shared as an `Arc` between the caller and the
//! [`Poller`].
//!
//! Accessors only read the cache. Commands resolve their target device
//! (explicit id, else the active device in the cache) and issue exactly one
//! remote call; without any resolvable device they do nothing.

mod poller;

pub use poller::Poller;
pub use poller::TickOutcome;

use std::{
    future::Future,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, Settings},
    error::{ApiError, Error, Result},
    management::{CacheSnapshot, StateCache, TokenStore},
    spotify::{
        auth::{AuthFlow, AuthState, SystemBrowser, UrlOpener},
        player::{PlaybackApi, SpotifyClient},
    },
    types::{Credentials, Device, PlaybackSnapshot, RepeatState, TrackItem},
    utils,
};

pub struct Backend {
    config: Arc<Config>,
    store: TokenStore,
    api: Arc<dyn PlaybackApi>,
    auth: AuthFlow,
    cache: StateCache,
    credentials: RwLock<Option<Credentials>>,
    refresh_lock: tokio::sync::Mutex<()>,
    reauthorizing: AtomicBool,
    shutdown: CancellationToken,
}

impl Backend {
    pub fn new(
        config: Config,
        store: TokenStore,
        api: Arc<dyn PlaybackApi>,
        opener: Arc<dyn UrlOpener>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            auth: AuthFlow::new(Arc::clone(&config), opener),
            config,
            store,
            api,
            cache: StateCache::new(),
            credentials: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            reauthorizing: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Wires the production collaborators and restores saved credentials.
    pub async fn from_config(config: Config) -> Arc<Self> {
        let settings = Settings::load(&config).await;
        let store = TokenStore::from_config(&config);
        let api = Arc::new(SpotifyClient::from_config(&config));
        let backend = Self::new(config, store, api, Arc::new(SystemBrowser));
        if let Some(credentials) = settings.credentials() {
            backend.set_credentials(credentials);
        }
        Arc::new(backend)
    }

    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.set_credentials(credentials);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_credentials(&self, credentials: Credentials) {
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credentials);
    }

    async fn remember_credentials(&self, credentials: &Credentials) {
        self.set_credentials(credentials.clone());
        let mut settings = Settings::load(&self.config).await;
        settings.set_credentials(credentials);
        if let Err(e) = settings.persist(&self.config).await {
            log::warn!("could not save settings: {e}");
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops the poller after its current tick and aborts a pending
    /// authorization attempt.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // --- authentication ---------------------------------------------------

    /// Offline check of the cached token.
    pub async fn is_authenticated(&self) -> bool {
        self.store
            .load()
            .await
            .is_some_and(|token| TokenStore::is_valid(&token))
    }

    /// Stores new credentials and makes sure a usable token exists, running
    /// the interactive browser flow when the cached one is missing or invalid.
    pub async fn update_client_credentials(&self, client_id: &str, port: &str) -> bool {
        match self.try_update_client_credentials(client_id, port).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("updating client credentials failed: {e}");
                false
            }
        }
    }

    pub async fn try_update_client_credentials(&self, client_id: &str, port: &str) -> Result<()> {
        let credentials = Credentials::new(client_id, port)?;
        self.remember_credentials(&credentials).await;

        let cached = self.store.load().await;
        if cached.as_ref().is_some_and(TokenStore::is_valid) {
            log::info!("cached token is valid, skipping browser authorization");
            return Ok(());
        }

        if self.store.exists().await {
            log::debug!("removing invalid cached token");
            self.store.clear().await?;
        }
        self.auth
            .authorize(&credentials, &self.store, &self.shutdown)
            .await?;
        log::info!("authorized as client {}", credentials.client_id);
        Ok(())
    }

    /// Accepts the credentials only if the existing token cache validates.
    /// Never opens a browser and never touches the network.
    pub async fn reauthenticate(&self, client_id: &str, port: &str) -> bool {
        match self.try_reauthenticate(client_id, port).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("reauthentication failed: {e}");
                false
            }
        }
    }

    pub async fn try_reauthenticate(&self, client_id: &str, port: &str) -> Result<()> {
        let credentials = Credentials::new(client_id, port)?;
        if !self.store.exists().await {
            return Err(Error::NotAuthenticated);
        }

        let token = self.store.load().await.ok_or(Error::TokenExpiredOrRevoked)?;
        if !TokenStore::is_valid(&token) {
            return Err(Error::TokenExpiredOrRevoked);
        }

        self.remember_credentials(&credentials).await;
        Ok(())
    }

    /// Returns a usable access token, refreshing and persisting it first when
    /// it has expired.
    pub async fn access_token(&self) -> Result<String> {
        let token = self.store.load().await.ok_or(Error::NotAuthenticated)?;
        if !TokenStore::is_expired(&token) {
            return Ok(token.access_token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let token = self.store.load().await.ok_or(Error::NotAuthenticated)?;
        if !TokenStore::is_expired(&token) {
            return Ok(token.access_token);
        }
        if token.refresh_token.is_empty() {
            return Err(Error::TokenExpiredOrRevoked);
        }

        let credentials = self.credentials().ok_or(Error::TokenExpiredOrRevoked)?;
        let refreshed = self.auth.refresh(&credentials.client_id, &token).await?;
        self.store.save(&refreshed).await?;
        Ok(refreshed.access_token)
    }

    /// Recovers from a rejected token: refresh first, then the interactive
    /// flow with the stored credentials.
    ///
    /// The cached token is only discarded once the token endpoint itself
    /// rejects the refresh token. Transport and server errors leave it in
    /// place for a later attempt.
    pub async fn reauthorize(&self) -> Result<()> {
        let credentials = self
            .credentials()
            .ok_or_else(|| Error::InvalidCredentials("no stored credentials".into()))?;

        if let Some(token) = self.store.load().await.filter(|t| !t.refresh_token.is_empty()) {
            match self.auth.refresh(&credentials.client_id, &token).await {
                Ok(refreshed) => {
                    self.store.save(&refreshed).await?;
                    log::info!("recovered session by refreshing the token");
                    return Ok(());
                }
                Err(Error::TokenExpiredOrRevoked) => {
                    log::debug!("refresh token rejected, falling back to browser");
                }
                Err(e) => {
                    log::warn!("token refresh failed, keeping cached token: {e}");
                    return Err(e);
                }
            }
        }

        self.store.clear().await?;
        self.auth
            .authorize(&credentials, &self.store, &self.shutdown)
            .await
            .map(|_| ())
    }

    /// Starts [`Backend::reauthorize`] in the background unless one is
    /// already running.
    pub(crate) fn spawn_reauthorization(self: &Arc<Self>) {
        if self.reauthorizing.swap(true, Ordering::AcqRel) {
            return;
        }
        let backend = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = backend.reauthorize().await {
                log::warn!("re-authorization failed, staying signed out: {e}");
            }
            backend.reauthorizing.store(false, Ordering::Release);
        });
    }

    // --- cached state -------------------------------------------------------

    /// Keeps the poller busy for another activity window.
    pub fn set_action_active(&self) {
        self.cache.mark_active();
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.cache.snapshot()
    }

    pub fn get_devices(&self) -> Vec<Device> {
        self.snapshot().devices().to_vec()
    }

    pub fn get_active_device_id(&self) -> Option<String> {
        let snapshot = self.snapshot();
        utils::active_device(snapshot.devices()).and_then(|d| d.id.clone())
    }

    pub fn get_active_device_name(&self) -> Option<String> {
        let snapshot = self.snapshot();
        utils::active_device(snapshot.devices()).map(|d| d.name.clone())
    }

    pub fn get_playback(&self) -> Option<PlaybackSnapshot> {
        self.snapshot().playback.clone()
    }

    pub fn get_playback_state(&self) -> Option<bool> {
        self.snapshot().playback.as_ref().map(|p| p.is_playing)
    }

    pub fn get_shuffle_mode(&self) -> Option<bool> {
        self.snapshot().playback.as_ref().map(|p| p.shuffle_state)
    }

    pub fn get_current_repeat_state(&self) -> Option<RepeatState> {
        self.snapshot().playback.as_ref().map(|p| p.repeat_state)
    }

    pub fn get_current_track(&self) -> Option<TrackItem> {
        self.snapshot()
            .playback
            .as_ref()
            .and_then(|p| p.item.clone())
    }

    /// Volume of `device_id`, or of the active device when `None`.
    pub fn get_volume(&self, device_id: Option<&str>) -> Option<u8> {
        let snapshot = self.snapshot();
        let devices = snapshot.devices();
        let device = match device_id {
            Some(id) => devices.iter().find(|d| d.id.as_deref() == Some(id)),
            None => utils::active_device(devices),
        }?;
        if device.supports_volume {
            device.volume_percent
        } else {
            None
        }
    }

    // --- commands -----------------------------------------------------------

    fn resolve_device(&self, device_id: Option<&str>) -> Option<String> {
        device_id
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| self.get_active_device_id())
    }

    /// Resolves the device and runs the remote call on it. No device means
    /// there is nothing to control yet, which is not an error.
    ///
    /// A rate limited call is reissued once after the server's `Retry-After`
    /// (or the configured default). Rate limiting never reaches the caller:
    /// if the retry is limited as well the command is dropped.
    async fn dispatch<F, Fut>(&self, command: &str, device_id: Option<&str>, call: F) -> Result<()>
    where
        F: Fn(String, String) -> Fut,
        Fut: Future<Output = std::result::Result<(), ApiError>>,
    {
        let Some(device) = self.resolve_device(device_id) else {
            log::debug!("{command}: no device to target, skipping");
            return Ok(());
        };

        let token = self.access_token().await?;
        log::debug!("{command} on device {device}");
        let backoff = match call(token.clone(), device.clone()).await {
            Err(ApiError::RateLimited(retry_after)) => {
                retry_after.unwrap_or(self.config.default_retry_after)
            }
            other => return other.map_err(Error::from),
        };

        log::info!("{command} rate limited, retrying in {}ms", backoff.as_millis());
        tokio::time::sleep(backoff).await;
        match call(token, device).await {
            Err(ApiError::RateLimited(_)) => {
                log::warn!("{command} still rate limited, dropping it");
                Ok(())
            }
            other => other.map_err(Error::from),
        }
    }

    pub async fn play(&self, device_id: Option<&str>) -> Result<()> {
        self.dispatch("play", device_id, |token, device| async move {
            self.api.play(&token, Some(&device)).await
        })
        .await
    }

    pub async fn pause(&self, device_id: Option<&str>) -> Result<()> {
        self.dispatch("pause", device_id, |token, device| async move {
            self.api.pause(&token, Some(&device)).await
        })
        .await
    }

    /// Pauses when the cache says something is playing, plays otherwise.
    pub async fn toggle_playback(&self, device_id: Option<&str>) -> Result<()> {
        if self.get_playback_state() == Some(true) {
            self.pause(device_id).await
        } else {
            self.play(device_id).await
        }
    }

    pub async fn next_track(&self, device_id: Option<&str>) -> Result<()> {
        self.dispatch("next", device_id, |token, device| async move {
            self.api.next(&token, Some(&device)).await
        })
        .await
    }

    pub async fn previous_track(&self, device_id: Option<&str>) -> Result<()> {
        self.dispatch("previous", device_id, |token, device| async move {
            self.api.previous(&token, Some(&device)).await
        })
        .await
    }

    pub async fn seek(&self, position_ms: u64, device_id: Option<&str>) -> Result<()> {
        self.dispatch("seek", device_id, |token, device| async move {
            self.api.seek(&token, position_ms, Some(&device)).await
        })
        .await
    }

    pub async fn set_volume(&self, volume_percent: u8, device_id: Option<&str>) -> Result<()> {
        let volume = volume_percent.min(100);
        self.dispatch("volume", device_id, |token, device| async move {
            self.api.set_volume(&token, volume, Some(&device)).await
        })
        .await
    }

    /// Changes the cached volume by `delta`, clamped to 0..=100. Does nothing
    /// while the volume of the target device is unknown.
    pub async fn adjust_volume(&self, delta: i32, device_id: Option<&str>) -> Result<()> {
        let Some(device) = self.resolve_device(device_id) else {
            return Ok(());
        };
        let Some(current) = self.get_volume(Some(&device)) else {
            log::debug!("volume of {device} unknown, skipping adjustment");
            return Ok(());
        };
        let target = utils::clamp_volume(i32::from(current) + delta);
        self.set_volume(target, Some(&device)).await
    }

    pub async fn shuffle(&self, state: bool, device_id: Option<&str>) -> Result<()> {
        self.dispatch("shuffle", device_id, |token, device| async move {
            self.api.set_shuffle(&token, state, Some(&device)).await
        })
        .await
    }

    pub async fn repeat(&self, mode: RepeatState, device_id: Option<&str>) -> Result<()> {
        self.dispatch("repeat", device_id, |token, device| async move {
            self.api.set_repeat(&token, mode, Some(&device)).await
        })
        .await
    }

    /// Moves to the next repeat mode after the cached one. Does nothing
    /// while no playback is known.
    pub async fn cycle_repeat(&self, device_id: Option<&str>) -> Result<()> {
        match self.get_current_repeat_state() {
            Some(mode) => self.repeat(mode.cycle(), device_id).await,
            None => Ok(()),
        }
    }
}
