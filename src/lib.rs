/// EvenLove Core - Event-scoped matching and engagement coordinator
///
/// The non-UI heart of the EvenLove event platform: per-event session cache
/// with single-flight initialization, resource state machines, discovery and
/// swipe processing, real-time channel management, dual-source match
/// reconciliation, and chat sessions with pagination, typing indicators and
/// read receipts.

pub mod backend;
pub mod channel;
pub mod chat;
pub mod config;
pub mod discovery;
pub mod error;
pub mod matches;
pub mod resource;
pub mod session;
pub mod types;

pub use backend::{DiscoveryFilters, EventBackend, MessagePage, ProfileDraft, SwipeOutcome};
pub use channel::{ChannelManager, ChannelTransport, ListenerId};
pub use chat::{ChatSession, SendFailure};
pub use config::SessionConfig;
pub use error::{EvenLoveError, Result};
pub use resource::ResourceState;
pub use session::EventSession;
pub use types::{
    ChannelEvent, ChannelEventKind, EventStats, Match, MatchSettings, MatchStatus, Message,
    MessageType, Profile, SwipeAction, SwipeRecord,
};
