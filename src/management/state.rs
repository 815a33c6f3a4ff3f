use std::{
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::types::{Device, PlaybackSnapshot};

/// Playback and device state as of one poller tick.
///
/// Both halves always come from the same tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub playback: Option<PlaybackSnapshot>,
    pub devices: Option<Vec<Device>>,
}

impl CacheSnapshot {
    pub fn is_empty(&self) -> bool {
        self.playback.is_none() && self.devices.is_none()
    }

    pub fn devices(&self) -> &[Device] {
        self.devices.as_deref().unwrap_or_default()
    }
}

/// Shared cache written by the poller and read by everyone else.
///
/// Writers swap in a whole new [`CacheSnapshot`]; readers clone the `Arc`
/// and keep working on it even if a newer snapshot lands meanwhile.
#[derive(Debug)]
pub struct StateCache {
    current: RwLock<Arc<CacheSnapshot>>,
    epoch: Instant,
    /// Milliseconds since `epoch` plus one; zero means never active.
    last_active: AtomicU64,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CacheSnapshot::default())),
            epoch: Instant::now(),
            last_active: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn replace(&self, playback: Option<PlaybackSnapshot>, devices: Vec<Device>) {
        self.swap(CacheSnapshot {
            playback,
            devices: Some(devices),
        });
    }

    pub(crate) fn clear(&self) {
        if !self.snapshot().is_empty() {
            self.swap(CacheSnapshot::default());
        }
    }

    fn swap(&self, next: CacheSnapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    pub fn mark_active(&self) {
        let now = self.epoch.elapsed().as_millis() as u64 + 1;
        self.last_active.store(now, Ordering::Relaxed);
    }

    /// Whether `mark_active` was called within the trailing `window`.
    pub fn is_active(&self, window: Duration) -> bool {
        match self.last_active.load(Ordering::Relaxed) {
            0 => false,
            stamp => {
                let now = self.epoch.elapsed().as_millis() as u64 + 1;
                let elapsed = now.saturating_sub(stamp);
                elapsed <= window.as_millis() as u64
            }
        }
    }
}
