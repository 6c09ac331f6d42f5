/// Match reconciliation
///
/// Matches arrive from two sources: polled snapshots (authoritative, replace
/// the board wholesale) and pushed deltas (prepend exactly one). Dedup relies
/// on the snapshot being authoritative and arriving after any prior push for
/// the same id; a stale snapshot resolving out of order can make a pushed
/// match transiently disappear until the next poll. That last-writer-wins
/// behavior is kept as-is from the product.
use crate::backend::EventBackend;
use crate::resource::{ResourceSlot, ResourceState};
use crate::types::Match;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Payload of the matches resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchList {
    /// Most recent first
    pub matches: Vec<Match>,
    pub unread_total: u32,
}

#[derive(Clone)]
pub struct MatchBoard {
    backend: Arc<dyn EventBackend>,
    slot: ResourceSlot<MatchList>,
}

impl MatchBoard {
    pub fn new(backend: Arc<dyn EventBackend>) -> Self {
        Self {
            backend,
            slot: ResourceSlot::new("matches"),
        }
    }

    pub async fn state(&self) -> ResourceState<MatchList> {
        self.slot.get().await
    }

    pub async fn unread_total(&self) -> u32 {
        self.slot
            .get()
            .await
            .payload()
            .map(|l| l.unread_total)
            .unwrap_or(0)
    }

    /// Fetch a full snapshot. Replaces the board wholesale and recomputes the
    /// unread total as the sum of server-reported per-match counts.
    pub async fn load(&self, event_id: &str) -> bool {
        let backend = self.backend.clone();
        let event_id = event_id.to_string();
        self.slot
            .load(|| async move {
                let matches = backend.get_matches(&event_id).await?;
                debug!("matches snapshot: {} matches", matches.len());
                Ok(snapshot(matches))
            })
            .await
    }

    /// Apply one pushed match: prepend it and bump the unread total by one.
    /// A push racing the first snapshot seeds the board so the match is
    /// visible immediately; the snapshot replaces it when it lands.
    pub async fn push(&self, matched: Match) {
        let mut matched = matched;
        matched.unread_count = 1;
        debug!("match push: {}", matched.id);

        let seed = matched.clone();
        let applied = self
            .slot
            .update(|list| {
                list.matches.insert(0, matched);
                list.unread_total += 1;
            })
            .await;
        if !applied {
            self.slot
                .succeed(MatchList {
                    matches: vec![seed],
                    unread_total: 1,
                })
                .await;
        }
    }

    /// Zero one conversation's unread count and recompute the total.
    pub async fn mark_read(&self, match_id: &str) {
        self.slot
            .update(|list| {
                if let Some(m) = list.matches.iter_mut().find(|m| m.id == match_id) {
                    m.unread_count = 0;
                }
                list.unread_total = list.matches.iter().map(|m| m.unread_count).sum();
            })
            .await;
    }

    /// Bump a conversation's last-message timestamp (message flow in an open
    /// room; unread accounting is untouched since the room is being read).
    pub async fn touch_last_message(&self, match_id: &str, at: DateTime<Utc>) {
        self.slot
            .update(|list| {
                if let Some(m) = list.matches.iter_mut().find(|m| m.id == match_id) {
                    m.last_message_at = Some(at);
                }
            })
            .await;
    }

    pub async fn reset(&self) {
        self.slot.reset().await;
    }
}

fn snapshot(matches: Vec<Match>) -> MatchList {
    let unread_total = matches.iter().map(|m| m.unread_count).sum();
    MatchList {
        matches,
        unread_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::{MatchStatus, Profile};

    fn profile(id: &str) -> Profile {
        Profile {
            id: id.to_string(),
            event_id: "e1".to_string(),
            user_id: format!("user-{}", id),
            display_name: id.to_string(),
            age: 25,
            bio: String::new(),
            photos: vec![],
            interests: vec![],
            is_active: true,
            last_active_at: Utc::now(),
        }
    }

    fn mk_match(id: &str, unread: u32) -> Match {
        Match {
            id: id.to_string(),
            event_id: "e1".to_string(),
            profile: profile(&format!("p-{}", id)),
            my_profile_id: "me".to_string(),
            status: MatchStatus::Active,
            matched_at: Utc::now(),
            last_message_at: None,
            unread_count: unread,
        }
    }

    #[test]
    fn test_snapshot_sums_unread() {
        let list = snapshot(vec![mk_match("m1", 2), mk_match("m2", 3)]);
        assert_eq!(list.unread_total, 5);
        assert_eq!(list.matches.len(), 2);
    }

    struct NoBackend;

    #[async_trait::async_trait]
    impl EventBackend for NoBackend {
        async fn get_profile(&self, _: &str) -> Result<Option<Profile>> {
            unimplemented!()
        }
        async fn create_profile(
            &self,
            _: &str,
            _: crate::backend::ProfileDraft,
        ) -> Result<Profile> {
            unimplemented!()
        }
        async fn update_profile(
            &self,
            _: &str,
            _: crate::backend::ProfileDraft,
        ) -> Result<Profile> {
            unimplemented!()
        }
        async fn get_discovery(
            &self,
            _: &str,
            _: &crate::backend::DiscoveryFilters,
        ) -> Result<Vec<Profile>> {
            unimplemented!()
        }
        async fn post_swipe(
            &self,
            _: &str,
            _: &str,
            _: crate::types::SwipeAction,
        ) -> Result<crate::backend::SwipeOutcome> {
            unimplemented!()
        }
        async fn get_matches(&self, _: &str) -> Result<Vec<Match>> {
            unimplemented!()
        }
        async fn get_messages(
            &self,
            _: &str,
            _: u32,
            _: u32,
        ) -> Result<crate::backend::MessagePage> {
            unimplemented!()
        }
        async fn post_message(
            &self,
            _: &str,
            _: &str,
            _: crate::types::MessageType,
        ) -> Result<crate::types::Message> {
            unimplemented!()
        }
        async fn mark_messages_read(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn get_settings(&self, _: &str) -> Result<crate::types::MatchSettings> {
            unimplemented!()
        }
        async fn update_settings(
            &self,
            _: &str,
            _: crate::types::MatchSettings,
        ) -> Result<crate::types::MatchSettings> {
            unimplemented!()
        }
        async fn get_stats(&self, _: &str) -> Result<crate::types::EventStats> {
            unimplemented!()
        }
    }

    fn board() -> MatchBoard {
        MatchBoard::new(Arc::new(NoBackend))
    }

    #[tokio::test]
    async fn test_push_prepends_and_increments() {
        let board = board();
        board.slot.succeed(snapshot(vec![mk_match("m1", 2)])).await;

        board.push(mk_match("m2", 0)).await;

        let state = board.state().await;
        let list = state.payload().unwrap();
        assert_eq!(list.matches[0].id, "m2");
        assert_eq!(list.unread_total, 3);
    }

    #[tokio::test]
    async fn test_push_before_snapshot_seeds_board() {
        let board = board();
        board.push(mk_match("m1", 0)).await;

        let state = board.state().await;
        let list = state.payload().unwrap();
        assert_eq!(list.matches.len(), 1);
        assert_eq!(list.unread_total, 1);
    }

    #[tokio::test]
    async fn test_mark_read_recomputes_total() {
        let board = board();
        board
            .slot
            .succeed(snapshot(vec![mk_match("m1", 2), mk_match("m2", 3)]))
            .await;

        board.mark_read("m1").await;
        assert_eq!(board.unread_total().await, 3);

        // unknown id leaves the board alone
        board.mark_read("nope").await;
        assert_eq!(board.unread_total().await, 3);
    }
}
