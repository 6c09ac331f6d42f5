/// Discovery engine and swipe processor
///
/// Holds the ordered candidate list (server ranking, never re-sorted
/// client-side) and the cursor pointing at the currently presented card.
/// Swipes append to an append-only history; undo appends a tombstone rather
/// than deleting anything.
use crate::backend::{DiscoveryFilters, EventBackend, SwipeOutcome};
use crate::error::{EvenLoveError, Result};
use crate::resource::{ResourceSlot, ResourceState};
use crate::types::{Profile, SwipeAction, SwipeRecord};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Payload of the discovery resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryList {
    pub candidates: Vec<Profile>,
    /// Index of the currently presented candidate; monotonically
    /// non-decreasing within one loaded list, capped at the list length.
    pub cursor: usize,
}

impl DiscoveryList {
    pub fn current(&self) -> Option<&Profile> {
        self.candidates.get(self.cursor)
    }

    /// More candidates behind the current one.
    pub fn has_more(&self) -> bool {
        self.cursor + 1 < self.candidates.len()
    }
}

#[derive(Clone)]
pub struct DiscoveryEngine {
    backend: Arc<dyn EventBackend>,
    slot: ResourceSlot<DiscoveryList>,
    history: Arc<RwLock<Vec<SwipeRecord>>>,
    /// One swipe at a time; guards against a double cursor-advance from a
    /// single user gesture.
    swipe_in_flight: Arc<RwLock<bool>>,
}

impl DiscoveryEngine {
    pub fn new(backend: Arc<dyn EventBackend>) -> Self {
        Self {
            backend,
            slot: ResourceSlot::new("discovery"),
            history: Arc::new(RwLock::new(Vec::new())),
            swipe_in_flight: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn state(&self) -> ResourceState<DiscoveryList> {
        self.slot.get().await
    }

    pub async fn current(&self) -> Option<Profile> {
        self.slot
            .get()
            .await
            .payload()
            .and_then(|l| l.current().cloned())
    }

    /// False once the list is exhausted (or not loaded). Exhaustion is
    /// signalled only; the caller decides whether to reload.
    pub async fn has_more(&self) -> bool {
        self.slot
            .get()
            .await
            .payload()
            .map(|l| l.has_more())
            .unwrap_or(false)
    }

    pub async fn history(&self) -> Vec<SwipeRecord> {
        self.history.read().await.clone()
    }

    /// (Re)load candidates. The cursor restarts at 0 on every successful load.
    pub async fn load(&self, event_id: &str, filters: &DiscoveryFilters) -> bool {
        let backend = self.backend.clone();
        let event_id = event_id.to_string();
        let filters = filters.clone();
        self.slot
            .load(|| async move {
                let candidates = backend.get_discovery(&event_id, &filters).await?;
                debug!("discovery loaded: {} candidates", candidates.len());
                Ok(DiscoveryList {
                    candidates,
                    cursor: 0,
                })
            })
            .await
    }

    /// Submit one swipe gesture for the candidate currently at the cursor.
    ///
    /// Regardless of the match outcome, a successful submission appends to
    /// the swipe history and advances the cursor by exactly 1 (never past the
    /// list length). A transport failure leaves both untouched so the gesture
    /// stays retryable.
    pub async fn submit_swipe(
        &self,
        event_id: &str,
        swiper_id: &str,
        profile_id: &str,
        action: SwipeAction,
    ) -> Result<SwipeOutcome> {
        if !action.is_gesture() {
            return Err(EvenLoveError::Validation(
                "Undo is not a swipe gesture".to_string(),
            ));
        }

        // Reject stale submissions before taking the in-flight slot.
        let current = self.current().await;
        match current {
            Some(p) if p.id == profile_id => {}
            _ => {
                return Err(EvenLoveError::Swipe(format!(
                    "stale swipe: {} is not the current candidate",
                    profile_id
                )))
            }
        }

        {
            let mut in_flight = self.swipe_in_flight.write().await;
            if *in_flight {
                return Err(EvenLoveError::Swipe(
                    "a swipe is already in flight".to_string(),
                ));
            }
            *in_flight = true;
        }

        let result = self.backend.post_swipe(event_id, profile_id, action).await;
        *self.swipe_in_flight.write().await = false;

        let outcome = result?;

        self.history.write().await.push(SwipeRecord {
            swiper_id: swiper_id.to_string(),
            target_id: profile_id.to_string(),
            action,
            created_at: Utc::now(),
        });
        self.slot
            .update(|list| {
                list.cursor = (list.cursor + 1).min(list.candidates.len());
            })
            .await;

        if outcome.is_match {
            info!("mutual match on swipe against {}", profile_id);
        }
        Ok(outcome)
    }

    /// Undo the last gesture: appends an `Undo` tombstone for its target and
    /// steps the cursor back by one (never below 0). History never shrinks.
    pub async fn undo_last_swipe(&self, event_id: &str, swiper_id: &str) -> Result<SwipeRecord> {
        let last = {
            let history = self.history.read().await;
            match history.last() {
                Some(r) if r.action.is_gesture() => r.clone(),
                _ => {
                    return Err(EvenLoveError::Swipe("nothing to undo".to_string()));
                }
            }
        };

        self.backend
            .post_swipe(event_id, &last.target_id, SwipeAction::Undo)
            .await?;

        let tombstone = SwipeRecord {
            swiper_id: swiper_id.to_string(),
            target_id: last.target_id.clone(),
            action: SwipeAction::Undo,
            created_at: Utc::now(),
        };
        self.history.write().await.push(tombstone.clone());
        self.slot
            .update(|list| {
                list.cursor = list.cursor.saturating_sub(1);
            })
            .await;

        debug!("swipe on {} undone", last.target_id);
        Ok(tombstone)
    }

    pub async fn reset(&self) {
        self.slot.reset().await;
        self.history.write().await.clear();
        *self.swipe_in_flight.write().await = false;
    }
}
