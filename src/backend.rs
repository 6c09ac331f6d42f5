/// Backend REST collaborator contract
///
/// The core never talks HTTP itself; the app supplies an implementation of
/// `EventBackend` wrapping its API client. Empty candidate or match lists are
/// success values, never errors.
use crate::error::Result;
use crate::types::{EventStats, Match, MatchSettings, Message, MessageType, Profile, SwipeAction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fields the owner submits when creating or editing a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub display_name: String,
    pub age: u32,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Filters forwarded to the discovery endpoint. Ranking stays server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryFilters {
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Result of posting a swipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeOutcome {
    pub is_match: bool,
    /// Present iff `is_match`
    #[serde(rename = "match")]
    pub matched: Option<Match>,
}

/// One backward page of chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Oldest-first within the page; page 1 is the most recent window
    pub messages: Vec<Message>,
    pub page: u32,
    pub total_pages: u32,
}

impl MessagePage {
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

#[async_trait]
pub trait EventBackend: Send + Sync {
    /// Own profile for this event; `None` if not yet created
    async fn get_profile(&self, event_id: &str) -> Result<Option<Profile>>;

    async fn create_profile(&self, event_id: &str, draft: ProfileDraft) -> Result<Profile>;

    async fn update_profile(&self, event_id: &str, draft: ProfileDraft) -> Result<Profile>;

    /// Candidates in server ranking order
    async fn get_discovery(
        &self,
        event_id: &str,
        filters: &DiscoveryFilters,
    ) -> Result<Vec<Profile>>;

    async fn post_swipe(
        &self,
        event_id: &str,
        target_id: &str,
        action: SwipeAction,
    ) -> Result<SwipeOutcome>;

    async fn get_matches(&self, event_id: &str) -> Result<Vec<Match>>;

    async fn get_messages(&self, match_id: &str, page: u32, page_size: u32)
        -> Result<MessagePage>;

    async fn post_message(
        &self,
        match_id: &str,
        content: &str,
        kind: MessageType,
    ) -> Result<Message>;

    async fn mark_messages_read(&self, match_id: &str) -> Result<()>;

    async fn get_settings(&self, event_id: &str) -> Result<MatchSettings>;

    async fn update_settings(
        &self,
        event_id: &str,
        settings: MatchSettings,
    ) -> Result<MatchSettings>;

    async fn get_stats(&self, event_id: &str) -> Result<EventStats>;
}
