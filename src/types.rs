/// Shared domain types for the EvenLove core
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One attendee's dating profile, scoped to a single event.
/// Created on first submission, mutated by its owner, never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub display_name: String,
    pub age: u32,
    #[serde(default)]
    pub bio: String,
    /// Photo URLs in owner-chosen order
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub is_active: bool,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Active,
    Expired,
    Blocked,
}

/// A confirmed mutual like between two profiles at one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub event_id: String,
    /// The other participant's profile
    pub profile: Profile,
    pub my_profile_id: String,
    pub status: MatchStatus,
    pub matched_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Server-reported unread message count for this conversation
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeAction {
    Pass,
    Like,
    SuperLike,
    /// Tombstone appended by undo; never submitted as a gesture
    Undo,
}

impl SwipeAction {
    /// Whether this action is a real gesture (undo is bookkeeping only)
    pub fn is_gesture(&self) -> bool {
        !matches!(self, SwipeAction::Undo)
    }
}

/// One entry in the append-only swipe log. The last action per
/// (swiper, target) pair is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeRecord {
    pub swiper_id: String,
    pub target_id: String,
    pub action: SwipeAction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageType,
    pub sent_at: DateTime<Utc>,
    /// Set once the recipient has read the message
    pub read_at: Option<DateTime<Utc>>,
    /// False while the message only exists as an optimistic local echo
    pub delivered: bool,
}

/// Per-user matching preferences for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSettings {
    pub discoverable: bool,
    pub min_age: u32,
    pub max_age: u32,
    pub show_distance: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            discoverable: true,
            min_age: 18,
            max_age: 99,
            show_distance: true,
        }
    }
}

/// Engagement counters for one profile at one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStats {
    pub swipes: u32,
    pub likes_received: u32,
    pub matches: u32,
    pub messages: u32,
}

/// Real-time events pushed over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A mutual like was confirmed while we weren't the swiper
    NewMatch {
        #[serde(rename = "match")]
        matched: Match,
    },
    /// A chat message arrived in a joined room
    NewMessage { message: Message },
    /// Peer started or stopped typing in a joined room
    Typing {
        match_id: String,
        user_id: String,
        is_typing: bool,
    },
    /// Peer read our messages in a joined room
    ReadReceipt { match_id: String, reader_id: String },
}

/// Registry key for channel listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEventKind {
    NewMatch,
    NewMessage,
    Typing,
    ReadReceipt,
}

impl ChannelEvent {
    pub fn kind(&self) -> ChannelEventKind {
        match self {
            ChannelEvent::NewMatch { .. } => ChannelEventKind::NewMatch,
            ChannelEvent::NewMessage { .. } => ChannelEventKind::NewMessage,
            ChannelEvent::Typing { .. } => ChannelEventKind::Typing,
            ChannelEvent::ReadReceipt { .. } => ChannelEventKind::ReadReceipt,
        }
    }

    /// Room (match id) this event is scoped to; `None` for event-wide pushes.
    pub fn room(&self) -> Option<&str> {
        match self {
            ChannelEvent::NewMatch { .. } => None,
            ChannelEvent::NewMessage { message } => Some(&message.match_id),
            ChannelEvent::Typing { match_id, .. } => Some(match_id),
            ChannelEvent::ReadReceipt { match_id, .. } => Some(match_id),
        }
    }
}
