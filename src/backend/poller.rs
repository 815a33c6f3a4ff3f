use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::task::JoinHandle;

use crate::{
    error::Error,
    types::{Device, PlaybackSnapshot},
};

use super::Backend;

/// What one tick did, and therefore how long to wait for the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nobody asked for state recently; cache cleared, no remote calls.
    Idle,
    /// No valid token; cache cleared, no remote calls.
    Unauthenticated,
    Refreshed,
    /// Cache kept as is; the next tick waits for the given duration.
    RateLimited(Duration),
    /// Token rejected; cache cleared and re-authorization started.
    AuthFailed,
    /// Any other failure; cache cleared.
    RemoteError,
}

/// Background task refreshing the playback and device cache of a [`Backend`].
///
/// The loop survives every error class; only the backend's shutdown token
/// stops it, checked between ticks.
pub struct Poller {
    backend: Arc<Backend>,
}

impl Poller {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    /// Start polling in a background task.
    #[must_use]
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let shutdown = self.backend.shutdown_token();
        log::debug!("poller started");

        while !shutdown.is_cancelled() {
            let started = Instant::now();
            let outcome = self.tick().await;
            let delay = self.delay_after(outcome, started.elapsed());

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        log::debug!("poller stopped");
    }

    /// Time to wait before the next tick. Normal ticks keep a fixed cadence;
    /// a rate limited tick waits the full backoff.
    fn delay_after(&self, outcome: TickOutcome, spent: Duration) -> Duration {
        match outcome {
            TickOutcome::RateLimited(backoff) => backoff,
            _ => self.backend.config().tick_interval.saturating_sub(spent),
        }
    }

    /// Runs one refresh cycle.
    pub async fn tick(&self) -> TickOutcome {
        let backend = &self.backend;
        let config = backend.config();
        let cache = backend.cache();

        if !cache.is_active(config.activity_window) {
            cache.clear();
            return TickOutcome::Idle;
        }

        if !backend.is_authenticated().await {
            cache.clear();
            return TickOutcome::Unauthenticated;
        }

        match self.fetch().await {
            Ok((playback, devices)) => {
                cache.replace(playback, devices);
                TickOutcome::Refreshed
            }
            Err(Error::RateLimited(retry_after)) => {
                let backoff = retry_after.unwrap_or(config.default_retry_after);
                log::info!("rate limited, pausing polls for {}ms", backoff.as_millis());
                TickOutcome::RateLimited(backoff)
            }
            Err(Error::TokenExpiredOrRevoked | Error::NotAuthenticated) => {
                log::warn!("token rejected while polling, re-authorizing");
                cache.clear();
                backend.spawn_reauthorization();
                TickOutcome::AuthFailed
            }
            Err(e) => {
                log::warn!("poll failed: {e}");
                cache.clear();
                TickOutcome::RemoteError
            }
        }
    }

    async fn fetch(&self) -> Result<(Option<PlaybackSnapshot>, Vec<Device>), Error> {
        let token = self.backend.access_token().await?;
        let playback = self.backend.api.get_current_playback(&token).await?;
        let devices = self.backend.api.get_devices(&token).await?;
        Ok((playback, devices))
    }
}
