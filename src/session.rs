/// Event session controller
///
/// One `EventSession` owns everything scoped to the current event: the cache
/// stamp, the resource slots, the discovery engine, the match board, the
/// channel connection and the open chat. Switching events is an explicit
/// invalidate-then-adopt inside `initialize_event`, so there is no
/// module-level flag choreography.
use crate::backend::{DiscoveryFilters, EventBackend, ProfileDraft, SwipeOutcome};
use crate::channel::{ChannelManager, ChannelTransport, ListenerId};
use crate::chat::{ChatSession, SendFailure};
use crate::config::SessionConfig;
use crate::discovery::{DiscoveryEngine, DiscoveryList};
use crate::error::{EvenLoveError, Result};
use crate::matches::{MatchBoard, MatchList};
use crate::resource::{ResourceSlot, ResourceState};
use crate::types::{
    ChannelEvent, ChannelEventKind, EventStats, MatchSettings, Message, Profile, SwipeAction,
    SwipeRecord,
};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct CacheStamp {
    event_id: String,
    stamped_at: Instant,
}

type InitFuture = Shared<BoxFuture<'static, Result<()>>>;

#[derive(Clone)]
pub struct EventSession {
    backend: Arc<dyn EventBackend>,
    channel: ChannelManager,
    config: SessionConfig,

    profile: ResourceSlot<Option<Profile>>,
    discovery: DiscoveryEngine,
    matches: MatchBoard,
    settings: ResourceSlot<MatchSettings>,
    stats: ResourceSlot<EventStats>,

    filters: Arc<RwLock<DiscoveryFilters>>,
    cache: Arc<RwLock<Option<CacheStamp>>>,
    active_event: Arc<RwLock<Option<String>>>,
    init_inflight: Arc<Mutex<Option<InitFuture>>>,
    match_listener: Arc<RwLock<Option<ListenerId>>>,
    chat: Arc<RwLock<Option<Arc<ChatSession>>>>,
}

impl EventSession {
    pub fn new(
        backend: Arc<dyn EventBackend>,
        transport: Arc<dyn ChannelTransport>,
        config: SessionConfig,
    ) -> Self {
        Self {
            channel: ChannelManager::new(transport),
            discovery: DiscoveryEngine::new(backend.clone()),
            matches: MatchBoard::new(backend.clone()),
            backend,
            config,
            profile: ResourceSlot::new("profile"),
            settings: ResourceSlot::new("settings"),
            stats: ResourceSlot::new("stats"),
            filters: Arc::new(RwLock::new(DiscoveryFilters::default())),
            cache: Arc::new(RwLock::new(None)),
            active_event: Arc::new(RwLock::new(None)),
            init_inflight: Arc::new(Mutex::new(None)),
            match_listener: Arc::new(RwLock::new(None)),
            chat: Arc::new(RwLock::new(None)),
        }
    }

    // ── Initialization ──

    /// Initialize the session for one event.
    ///
    /// Single-flight: a pending initialization is shared with every caller
    /// instead of duplicated. A fresh cache stamp for the same event returns
    /// immediately with no backend traffic. Profile, discovery and matches
    /// load in parallel with the channel connect; every branch settles
    /// independently and a branch failure lands in that resource's error
    /// state rather than aborting the rest.
    pub async fn initialize_event(&self, event_id: &str) -> Result<()> {
        let fut = {
            let mut inflight = self.init_inflight.lock().await;
            match inflight.as_ref() {
                Some(fut) => {
                    debug!("initialization already pending, joining it");
                    fut.clone()
                }
                None => {
                    let this = self.clone();
                    let event_id = event_id.to_string();
                    let fut: InitFuture = async move {
                        let result = this.run_initialize(&event_id).await;
                        this.init_inflight.lock().await.take();
                        result
                    }
                    .boxed()
                    .shared();
                    *inflight = Some(fut.clone());
                    fut
                }
            }
        };
        fut.await
    }

    async fn run_initialize(&self, event_id: &str) -> Result<()> {
        if self.cache_fresh(event_id).await {
            debug!("cache fresh for event {}, skipping loads", event_id);
            return Ok(());
        }

        let previous = self.active_event.read().await.clone();
        if previous.as_deref().is_some_and(|e| e != event_id) {
            info!("switching session to event {}", event_id);
            self.reset_state().await;
        }
        *self.active_event.write().await = Some(event_id.to_string());

        let filters = self.filters.read().await.clone();
        let (_, _, _, channel_result) = tokio::join!(
            self.load_profile_slot(event_id),
            self.discovery.load(event_id, &filters),
            self.matches.load(event_id),
            self.connect_channel(event_id),
        );
        if let Err(e) = channel_result {
            // Degrade to polling-only; polled reads are unaffected.
            warn!("realtime channel unavailable for event {}: {}", event_id, e);
        }

        *self.cache.write().await = Some(CacheStamp {
            event_id: event_id.to_string(),
            stamped_at: Instant::now(),
        });
        info!("event {} session initialized", event_id);
        Ok(())
    }

    /// Force-reload discovery and matches, bypassing the cache. The channel
    /// and the profile are left alone. Only the active event can be
    /// refreshed; anything else would feed the slots another event's data.
    pub async fn refresh(&self, event_id: &str) -> Result<()> {
        let active = self.require_active_event().await?;
        if active != event_id {
            return Err(EvenLoveError::Validation(format!(
                "event {} is not the active session",
                event_id
            )));
        }
        let filters = self.filters.read().await.clone();
        tokio::join!(
            self.discovery.load(event_id, &filters),
            self.matches.load(event_id),
        );
        Ok(())
    }

    /// Idempotent full reset: resources to idle, cache stamp cleared,
    /// channel subscriptions and connection torn down, chat closed.
    pub async fn reset_state(&self) {
        self.close_chat().await;
        self.channel.clear_listeners().await;
        self.channel.disconnect().await;
        *self.match_listener.write().await = None;

        self.profile.reset().await;
        self.discovery.reset().await;
        self.matches.reset().await;
        self.settings.reset().await;
        self.stats.reset().await;

        *self.cache.write().await = None;
        *self.active_event.write().await = None;
        debug!("session state reset");
    }

    pub async fn disconnect_channel(&self) {
        self.channel.disconnect().await;
    }

    /// Reconnect the channel for the active event after a connect failure
    /// or an explicit disconnect.
    pub async fn reconnect_channel(&self) -> Result<()> {
        let event_id = self.require_active_event().await?;
        self.connect_channel(&event_id).await
    }

    async fn connect_channel(&self, event_id: &str) -> Result<()> {
        self.channel.connect(event_id).await?;

        let mut listener = self.match_listener.write().await;
        if listener.is_none() {
            let board = self.matches.clone();
            let id = self
                .channel
                .on(ChannelEventKind::NewMatch, move |event| {
                    let board = board.clone();
                    async move {
                        if let ChannelEvent::NewMatch { matched } = event {
                            board.push(matched).await;
                        }
                    }
                    .boxed()
                })
                .await;
            *listener = Some(id);
        }
        Ok(())
    }

    async fn cache_fresh(&self, event_id: &str) -> bool {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .map(|stamp| {
                stamp.event_id == event_id && stamp.stamped_at.elapsed() < self.config.cache_ttl
            })
            .unwrap_or(false)
    }

    async fn require_active_event(&self) -> Result<String> {
        self.active_event
            .read()
            .await
            .clone()
            .ok_or_else(|| EvenLoveError::Validation("No active event session".to_string()))
    }

    async fn require_own_profile(&self) -> Result<Profile> {
        self.profile
            .get()
            .await
            .payload()
            .cloned()
            .flatten()
            .ok_or_else(|| {
                EvenLoveError::Validation("Create a profile before using matching".to_string())
            })
    }

    // ── Profile ──

    async fn load_profile_slot(&self, event_id: &str) -> bool {
        let backend = self.backend.clone();
        let event_id = event_id.to_string();
        self.profile
            .load(|| async move { backend.get_profile(&event_id).await })
            .await
    }

    pub async fn load_profile(&self) -> Result<()> {
        let event_id = self.require_active_event().await?;
        self.load_profile_slot(&event_id).await;
        Ok(())
    }

    /// Create the profile for this event. Failures propagate to the caller
    /// (the form owns the compensating UI) and leave the slot untouched.
    pub async fn create_profile(&self, draft: ProfileDraft) -> Result<Profile> {
        let event_id = self.require_active_event().await?;
        let profile = self.backend.create_profile(&event_id, draft).await?;
        self.profile.succeed(Some(profile.clone())).await;
        Ok(profile)
    }

    pub async fn update_profile(&self, draft: ProfileDraft) -> Result<Profile> {
        let event_id = self.require_active_event().await?;
        let profile = self.backend.update_profile(&event_id, draft).await?;
        self.profile.succeed(Some(profile.clone())).await;
        Ok(profile)
    }

    pub async fn profile_state(&self) -> ResourceState<Option<Profile>> {
        self.profile.get().await
    }

    // ── Discovery & swipes ──

    pub async fn discovery_state(&self) -> ResourceState<DiscoveryList> {
        self.discovery.state().await
    }

    pub async fn current_candidate(&self) -> Option<Profile> {
        self.discovery.current().await
    }

    pub async fn has_more_candidates(&self) -> bool {
        self.discovery.has_more().await
    }

    pub async fn set_discovery_filters(&self, filters: DiscoveryFilters) {
        *self.filters.write().await = filters;
    }

    pub async fn swipe_history(&self) -> Vec<SwipeRecord> {
        self.discovery.history().await
    }

    /// Submit one swipe for the current candidate. A confirmed mutual match
    /// is prepended to the match board with the unread total bumped by one.
    pub async fn submit_swipe(&self, profile_id: &str, action: SwipeAction) -> Result<SwipeOutcome> {
        let event_id = self.require_active_event().await?;
        let me = self.require_own_profile().await?;

        let outcome = self
            .discovery
            .submit_swipe(&event_id, &me.id, profile_id, action)
            .await?;

        if outcome.is_match {
            if let Some(matched) = outcome.matched.clone() {
                self.matches.push(matched).await;
            }
        }
        Ok(outcome)
    }

    pub async fn undo_last_swipe(&self) -> Result<SwipeRecord> {
        let event_id = self.require_active_event().await?;
        let me = self.require_own_profile().await?;
        self.discovery.undo_last_swipe(&event_id, &me.id).await
    }

    // ── Matches ──

    pub async fn matches_state(&self) -> ResourceState<MatchList> {
        self.matches.state().await
    }

    pub async fn unread_total(&self) -> u32 {
        self.matches.unread_total().await
    }

    // ── Chat ──

    /// Open the chat for one match: joins its room, wires listeners and
    /// loads the first history page. An already-open chat for another match
    /// is closed first.
    pub async fn open_chat(&self, match_id: &str) -> Result<()> {
        if let Some(existing) = self.chat.read().await.clone() {
            if existing.match_id() == match_id {
                return Ok(());
            }
        }
        self.close_chat().await;

        let me = self.require_own_profile().await?;
        let session = ChatSession::open(
            match_id,
            &me.id,
            self.backend.clone(),
            self.channel.clone(),
            self.matches.clone(),
            self.config.clone(),
        )
        .await?;
        *self.chat.write().await = Some(session);
        Ok(())
    }

    pub async fn close_chat(&self) {
        if let Some(chat) = self.chat.write().await.take() {
            chat.close().await;
        }
    }

    pub async fn chat(&self) -> Option<Arc<ChatSession>> {
        self.chat.read().await.clone()
    }

    pub async fn send_message(
        &self,
        match_id: &str,
        text: String,
    ) -> std::result::Result<Message, SendFailure> {
        let Some(chat) = self.open_chat_for(match_id).await else {
            return Err(SendFailure {
                text,
                error: EvenLoveError::Chat(format!("no open chat for match {}", match_id)),
            });
        };
        chat.send(text).await
    }

    pub async fn load_message_page(&self, match_id: &str, page: u32) -> Result<()> {
        let chat = self.open_chat_for(match_id).await.ok_or_else(|| {
            EvenLoveError::Chat(format!("no open chat for match {}", match_id))
        })?;
        chat.load_page(page).await
    }

    async fn open_chat_for(&self, match_id: &str) -> Option<Arc<ChatSession>> {
        self.chat
            .read()
            .await
            .clone()
            .filter(|c| c.match_id() == match_id)
    }

    // ── Settings & stats ──

    pub async fn load_settings(&self) -> Result<()> {
        let event_id = self.require_active_event().await?;
        let backend = self.backend.clone();
        self.settings
            .load(|| async move { backend.get_settings(&event_id).await })
            .await;
        Ok(())
    }

    pub async fn update_settings(&self, settings: MatchSettings) -> Result<MatchSettings> {
        let event_id = self.require_active_event().await?;
        let saved = self.backend.update_settings(&event_id, settings).await?;
        self.settings.succeed(saved.clone()).await;
        Ok(saved)
    }

    pub async fn settings_state(&self) -> ResourceState<MatchSettings> {
        self.settings.get().await
    }

    pub async fn load_stats(&self) -> Result<()> {
        let event_id = self.require_active_event().await?;
        let backend = self.backend.clone();
        self.stats
            .load(|| async move { backend.get_stats(&event_id).await })
            .await;
        Ok(())
    }

    pub async fn stats_state(&self) -> ResourceState<EventStats> {
        self.stats.get().await
    }

    pub async fn channel_connected(&self) -> bool {
        self.channel.is_connected().await
    }
}
