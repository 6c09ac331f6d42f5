/// Resource state machines
///
/// Every fetched data slice (profile, discovery, matches, settings, stats)
/// is tracked by its own `ResourceState`. The enum makes the loading gate
/// explicit: `begin_load` is the only transition into `Loading` and refuses
/// re-entry, so two concurrent requests for one resource cannot race.
use crate::error::{EvenLoveError, Result};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceState<T> {
    Idle,
    Loading,
    Success {
        payload: T,
        last_fetched_at: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl<T> ResourceState<T> {
    pub fn is_idle(&self) -> bool {
        matches!(self, ResourceState::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ResourceState::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResourceState::Success { .. })
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            ResourceState::Success { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ResourceState::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// One resource slot shared between the session and its sub-managers.
///
/// The epoch counts resets. A load captures the epoch before fetching and
/// discards its result when the epoch moved, so a fetch still in flight when
/// the session switches events cannot clobber the new event's data.
pub struct ResourceSlot<T> {
    name: &'static str,
    state: Arc<RwLock<ResourceState<T>>>,
    epoch: Arc<AtomicU64>,
}

impl<T: Clone + Send + Sync> ResourceSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(RwLock::new(ResourceState::Idle)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of the current state for the UI.
    pub async fn get(&self) -> ResourceState<T> {
        self.state.read().await.clone()
    }

    /// Transition into `Loading`. Returns false (and leaves the state
    /// untouched) when a load is already in flight.
    pub async fn begin_load(&self) -> bool {
        let mut state = self.state.write().await;
        if state.is_loading() {
            debug!("{}: load already in flight, skipping", self.name);
            return false;
        }
        *state = ResourceState::Loading;
        true
    }

    pub async fn succeed(&self, payload: T) {
        let mut state = self.state.write().await;
        *state = ResourceState::Success {
            payload,
            last_fetched_at: Utc::now(),
        };
    }

    pub async fn fail(&self, err: &EvenLoveError) {
        debug!("{}: load failed: {}", self.name, err);
        let mut state = self.state.write().await;
        *state = ResourceState::Error {
            message: err.user_message(),
        };
    }

    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *state = ResourceState::Idle;
    }

    /// Mutate a `Success` payload in place. Returns false when the slot
    /// holds no payload yet.
    pub async fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.state.write().await;
        match &mut *state {
            ResourceState::Success { payload, .. } => {
                f(payload);
                true
            }
            _ => false,
        }
    }

    /// Run `fetch` under the loading gate and record the outcome into the
    /// slot. Returns false without fetching when a load is already in flight,
    /// and false without recording when the slot was reset mid-fetch.
    pub async fn load<F, Fut>(&self, fetch: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.begin_load().await {
            return false;
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        let result = fetch().await;

        let mut state = self.state.write().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("{}: discarding result of a superseded load", self.name);
            return false;
        }
        match result {
            Ok(payload) => {
                *state = ResourceState::Success {
                    payload,
                    last_fetched_at: Utc::now(),
                };
            }
            Err(e) => {
                debug!("{}: load failed: {}", self.name, e);
                *state = ResourceState::Error {
                    message: e.user_message(),
                };
            }
        }
        true
    }
}

impl<T> Clone for ResourceSlot<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            state: self.state.clone(),
            epoch: self.epoch.clone(),
        }
    }
}
