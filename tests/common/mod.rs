/// Shared fixtures for integration tests: an in-memory backend and a
/// scriptable channel transport.
use async_trait::async_trait;
use chrono::Utc;
use evenlove_core::{
    ChannelEvent, ChannelTransport, DiscoveryFilters, EventBackend, EventStats, Match,
    MatchSettings, MatchStatus, Message, MessagePage, MessageType, Profile, ProfileDraft,
    SwipeAction, SwipeOutcome,
};
use evenlove_core::{EvenLoveError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

pub fn mk_profile(id: &str) -> Profile {
    mk_profile_at(id, "e1")
}

pub fn mk_profile_at(id: &str, event_id: &str) -> Profile {
    Profile {
        id: id.to_string(),
        event_id: event_id.to_string(),
        user_id: format!("user-{}", id),
        display_name: id.to_string(),
        age: 27,
        bio: String::new(),
        photos: vec![],
        interests: vec![],
        is_active: true,
        last_active_at: Utc::now(),
    }
}

pub fn mk_match(id: &str, unread: u32) -> Match {
    Match {
        id: id.to_string(),
        event_id: "e1".to_string(),
        profile: mk_profile(&format!("p-{}", id)),
        my_profile_id: "me".to_string(),
        status: MatchStatus::Active,
        matched_at: Utc::now(),
        last_message_at: None,
        unread_count: unread,
    }
}

pub fn mk_message(id: &str, match_id: &str, sender: &str, content: &str) -> Message {
    Message {
        id: id.to_string(),
        match_id: match_id.to_string(),
        sender_id: sender.to_string(),
        content: content.to_string(),
        kind: MessageType::Text,
        sent_at: Utc::now(),
        read_at: None,
        delivered: true,
    }
}

#[derive(Default)]
pub struct MockBackend {
    pub profile: Mutex<Option<Profile>>,
    pub candidates: Mutex<Vec<Profile>>,
    pub matches: Mutex<Vec<Match>>,
    /// Oldest-first durable chat history, keyed implicitly to one match
    pub history: Mutex<Vec<Message>>,
    /// Target profile ids whose swipe confirms a mutual match
    pub match_on: Mutex<HashSet<String>>,
    /// Artificial latency per backend call (0 = resolve immediately)
    pub latency: Mutex<Duration>,
    pub fail_post_message: AtomicBool,

    pub profile_fetches: AtomicUsize,
    pub discovery_fetches: AtomicUsize,
    pub matches_fetches: AtomicUsize,
    pub message_fetches: AtomicUsize,
    pub swipe_posts: AtomicUsize,
    pub message_posts: AtomicUsize,
    pub mark_read_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_me(self) -> Self {
        *self.profile.lock().unwrap() = Some(mk_profile("me"));
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl EventBackend for MockBackend {
    async fn get_profile(&self, _event_id: &str) -> Result<Option<Profile>> {
        self.simulate_latency().await;
        self.profile_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.profile.lock().unwrap().clone())
    }

    async fn create_profile(&self, event_id: &str, draft: ProfileDraft) -> Result<Profile> {
        if draft.age < 18 {
            return Err(EvenLoveError::Validation(
                "Age must be at least 18".to_string(),
            ));
        }
        let profile = Profile {
            id: "me".to_string(),
            event_id: event_id.to_string(),
            user_id: "user-me".to_string(),
            display_name: draft.display_name,
            age: draft.age,
            bio: draft.bio,
            photos: draft.photos,
            interests: draft.interests,
            is_active: true,
            last_active_at: Utc::now(),
        };
        *self.profile.lock().unwrap() = Some(profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, event_id: &str, draft: ProfileDraft) -> Result<Profile> {
        self.create_profile(event_id, draft).await
    }

    async fn get_discovery(
        &self,
        event_id: &str,
        _filters: &DiscoveryFilters,
    ) -> Result<Vec<Profile>> {
        self.simulate_latency().await;
        self.discovery_fetches.fetch_add(1, Ordering::SeqCst);
        let candidates = self.candidates.lock().unwrap();
        Ok(candidates
            .iter()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn post_swipe(
        &self,
        _event_id: &str,
        target_id: &str,
        action: SwipeAction,
    ) -> Result<SwipeOutcome> {
        self.simulate_latency().await;
        self.swipe_posts.fetch_add(1, Ordering::SeqCst);
        if action == SwipeAction::Undo {
            return Ok(SwipeOutcome {
                is_match: false,
                matched: None,
            });
        }
        let is_match = action != SwipeAction::Pass
            && self.match_on.lock().unwrap().contains(target_id);
        Ok(SwipeOutcome {
            is_match,
            matched: is_match.then(|| mk_match(&format!("m-{}", target_id), 0)),
        })
    }

    async fn get_matches(&self, _event_id: &str) -> Result<Vec<Match>> {
        self.simulate_latency().await;
        self.matches_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.matches.lock().unwrap().clone())
    }

    async fn get_messages(
        &self,
        _match_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage> {
        self.simulate_latency().await;
        self.message_fetches.fetch_add(1, Ordering::SeqCst);
        let history = self.history.lock().unwrap();
        let len = history.len();
        let size = page_size as usize;
        let total_pages = ((len + size - 1) / size) as u32;
        let end = len.saturating_sub((page as usize - 1) * size);
        let start = end.saturating_sub(size);
        Ok(MessagePage {
            messages: history[start..end].to_vec(),
            page,
            total_pages,
        })
    }

    async fn post_message(
        &self,
        match_id: &str,
        content: &str,
        kind: MessageType,
    ) -> Result<Message> {
        self.simulate_latency().await;
        if self.fail_post_message.load(Ordering::SeqCst) {
            return Err(EvenLoveError::NetworkUnreachable(
                "post_message refused".to_string(),
            ));
        }
        let n = self.message_posts.fetch_add(1, Ordering::SeqCst) + 1;
        let saved = Message {
            id: format!("srv-{}", n),
            match_id: match_id.to_string(),
            sender_id: "me".to_string(),
            content: content.to_string(),
            kind,
            sent_at: Utc::now(),
            read_at: None,
            delivered: true,
        };
        self.history.lock().unwrap().push(saved.clone());
        Ok(saved)
    }

    async fn mark_messages_read(&self, _match_id: &str) -> Result<()> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_settings(&self, _event_id: &str) -> Result<MatchSettings> {
        Ok(MatchSettings::default())
    }

    async fn update_settings(
        &self,
        _event_id: &str,
        settings: MatchSettings,
    ) -> Result<MatchSettings> {
        Ok(settings)
    }

    async fn get_stats(&self, _event_id: &str) -> Result<EventStats> {
        Ok(EventStats::default())
    }
}

#[derive(Default)]
pub struct MockTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<ChannelEvent>>>,
    pub emitted: Mutex<Vec<ChannelEvent>>,
    pub joined: Mutex<Vec<String>>,
    pub left: Mutex<Vec<String>>,
    pub fail_connect: AtomicBool,
    pub connects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one server event into the open connection.
    pub fn push(&self, event: ChannelEvent) {
        self.tx
            .lock()
            .unwrap()
            .as_ref()
            .expect("transport not connected")
            .send(event)
            .unwrap();
    }

    pub fn emitted_events(&self) -> Vec<ChannelEvent> {
        self.emitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn connect(&self, _event_id: &str) -> Result<mpsc::UnboundedReceiver<ChannelEvent>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(EvenLoveError::ChannelConnect(
                "connection refused".to_string(),
            ));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn disconnect(&self) {
        self.tx.lock().unwrap().take();
    }

    async fn join_room(&self, match_id: &str) -> Result<()> {
        self.joined.lock().unwrap().push(match_id.to_string());
        Ok(())
    }

    async fn leave_room(&self, match_id: &str) -> Result<()> {
        self.left.lock().unwrap().push(match_id.to_string());
        Ok(())
    }

    async fn emit(&self, event: ChannelEvent) -> Result<()> {
        self.emitted.lock().unwrap().push(event);
        Ok(())
    }
}

/// Install the test subscriber once; respects RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Let spawned pump/timer tasks run.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
