/// Chat session manager
///
/// One `ChatSession` per open conversation. History loads backward from the
/// most recent page into an oldest-first buffer. Sends are optimistic: the
/// message goes out over the real-time channel immediately, in parallel with
/// the durable API write. If the durable write fails the local echo is
/// removed and the composer text handed back for retry; the copy already
/// delivered to the peer is not retracted (kept product behavior).
use crate::backend::EventBackend;
use crate::channel::{ChannelManager, ListenerId};
use crate::config::SessionConfig;
use crate::error::{EvenLoveError, Result};
use crate::matches::MatchBoard;
use crate::types::{ChannelEvent, ChannelEventKind, Message, MessageType};
use chrono::Utc;
use futures_util::FutureExt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// A failed send, carrying the composer text back to the caller for retry.
#[derive(Debug, Clone, PartialEq)]
pub struct SendFailure {
    pub text: String,
    pub error: EvenLoveError,
}

#[derive(Default)]
struct ChatState {
    /// Oldest-first
    messages: Vec<Message>,
    /// Highest page loaded so far (0 = none)
    page: u32,
    total_pages: u32,
    loading: bool,
    peer_typing: bool,
}

#[derive(Default)]
struct TypingState {
    active: bool,
    /// Bumped on every input change; stale auto-clear timers check it
    generation: u64,
}

pub struct ChatSession {
    match_id: String,
    my_profile_id: String,
    backend: Arc<dyn EventBackend>,
    channel: ChannelManager,
    board: MatchBoard,
    config: SessionConfig,
    state: Arc<RwLock<ChatState>>,
    typing: Arc<RwLock<TypingState>>,
    listeners: Arc<RwLock<Vec<(ChannelEventKind, ListenerId)>>>,
}

impl ChatSession {
    /// Open a chat: join the room, wire the listeners, load the first page.
    pub async fn open(
        match_id: &str,
        my_profile_id: &str,
        backend: Arc<dyn EventBackend>,
        channel: ChannelManager,
        board: MatchBoard,
        config: SessionConfig,
    ) -> Result<Arc<Self>> {
        let session = Arc::new(Self {
            match_id: match_id.to_string(),
            my_profile_id: my_profile_id.to_string(),
            backend,
            channel,
            board,
            config,
            state: Arc::new(RwLock::new(ChatState::default())),
            typing: Arc::new(RwLock::new(TypingState::default())),
            listeners: Arc::new(RwLock::new(Vec::new())),
        });

        // Join before the page load so nothing pushed mid-load is missed.
        // Not fatal when the channel is down: history still works.
        if let Err(e) = session.channel.join_room(match_id).await {
            warn!("chat {} opened without realtime: {}", match_id, e);
        } else {
            session.attach_listeners().await;
        }

        if let Err(e) = session.load_page(1).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Oldest-first snapshot of the loaded history.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    pub async fn has_more(&self) -> bool {
        let state = self.state.read().await;
        state.page < state.total_pages
    }

    pub async fn peer_typing(&self) -> bool {
        self.state.read().await.peer_typing
    }

    /// Load one backward history page and prepend it to the buffer.
    /// Deduplicated by message id against everything already held (the
    /// optimistic echo reconciled to its server id in particular).
    pub async fn load_page(&self, page: u32) -> Result<()> {
        if page == 0 {
            return Err(EvenLoveError::Validation(
                "History pages are 1-based".to_string(),
            ));
        }
        {
            let mut state = self.state.write().await;
            if state.loading {
                debug!("chat {}: page load already in flight", self.match_id);
                return Ok(());
            }
            state.loading = true;
        }

        let result = self
            .backend
            .get_messages(&self.match_id, page, self.config.chat_page_size)
            .await;

        let page_data = match result {
            Ok(p) => p,
            Err(e) => {
                self.state.write().await.loading = false;
                return Err(e);
            }
        };

        let unread_from_peer = {
            let mut state = self.state.write().await;
            let fresh: Vec<Message> = page_data
                .messages
                .iter()
                .filter(|m| !state.messages.iter().any(|held| held.id == m.id))
                .cloned()
                .collect();
            let unread = fresh
                .iter()
                .any(|m| m.sender_id != self.my_profile_id && m.read_at.is_none());

            let mut merged = fresh;
            merged.append(&mut state.messages);
            state.messages = merged;
            state.page = state.page.max(page_data.page);
            state.total_pages = page_data.total_pages;
            state.loading = false;
            unread
        };

        if unread_from_peer {
            self.mark_read().await;
        }
        Ok(())
    }

    /// Send one text message.
    pub async fn send(&self, text: String) -> std::result::Result<Message, SendFailure> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SendFailure {
                text,
                error: EvenLoveError::Validation("Message cannot be empty".to_string()),
            });
        }

        let optimistic = Message {
            id: Uuid::new_v4().to_string(),
            match_id: self.match_id.clone(),
            sender_id: self.my_profile_id.clone(),
            content: trimmed.to_string(),
            kind: MessageType::Text,
            sent_at: Utc::now(),
            read_at: None,
            delivered: false,
        };
        self.state
            .write()
            .await
            .messages
            .push(optimistic.clone());

        // Composer is now empty; drop the typing indicator.
        self.stop_typing().await;

        // Channel echo and durable write run in parallel, unordered.
        let echo = self.channel.emit(ChannelEvent::NewMessage {
            message: optimistic.clone(),
        });
        let durable = self
            .backend
            .post_message(&self.match_id, trimmed, MessageType::Text);
        let (echo_result, durable_result) = tokio::join!(echo, durable);

        if let Err(e) = echo_result {
            debug!("optimistic echo not delivered: {}", e);
        }

        match durable_result {
            Ok(mut saved) => {
                saved.delivered = true;
                let mut state = self.state.write().await;
                if let Some(held) = state.messages.iter_mut().find(|m| m.id == optimistic.id) {
                    *held = saved.clone();
                } else {
                    state.messages.push(saved.clone());
                }
                drop(state);
                self.board
                    .touch_last_message(&self.match_id, saved.sent_at)
                    .await;
                Ok(saved)
            }
            Err(e) => {
                // The peer may already have the echo; only the local copy is
                // rolled back, and the text goes back to the composer.
                self.state
                    .write()
                    .await
                    .messages
                    .retain(|m| m.id != optimistic.id);
                warn!("durable write failed for chat {}: {}", self.match_id, e);
                Err(SendFailure {
                    text: trimmed.to_string(),
                    error: e,
                })
            }
        }
    }

    /// Feed composer input changes. Broadcasts `typing(true)` only on the
    /// empty→non-empty transition, re-arms the auto-clear on further
    /// keystrokes, and clears immediately when the input empties.
    pub async fn set_input(&self, text: &str) {
        if text.is_empty() {
            self.stop_typing().await;
            return;
        }

        let (generation, first) = {
            let mut typing = self.typing.write().await;
            typing.generation += 1;
            let first = !typing.active;
            typing.active = true;
            (typing.generation, first)
        };
        if first {
            self.emit_typing(true).await;
        }

        // Auto-clear after the configured idle window unless re-armed.
        let state = self.typing.clone();
        let channel = self.channel.clone();
        let match_id = self.match_id.clone();
        let user_id = self.my_profile_id.clone();
        let timeout = self.config.typing_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut typing = state.write().await;
            if typing.generation != generation || !typing.active {
                return;
            }
            typing.active = false;
            drop(typing);
            let _ = channel
                .emit(ChannelEvent::Typing {
                    match_id,
                    user_id,
                    is_typing: false,
                })
                .await;
        });
    }

    /// Close the chat: leave the room, drop listeners, cancel typing.
    pub async fn close(&self) {
        self.stop_typing().await;
        for (kind, id) in self.listeners.write().await.drain(..) {
            self.channel.off(kind, id).await;
        }
        self.channel.leave_room(&self.match_id).await;
        debug!("chat {} closed", self.match_id);
    }

    async fn stop_typing(&self) {
        let was_active = {
            let mut typing = self.typing.write().await;
            typing.generation += 1;
            let was = typing.active;
            typing.active = false;
            was
        };
        if was_active {
            self.emit_typing(false).await;
        }
    }

    async fn emit_typing(&self, is_typing: bool) {
        let result = self
            .channel
            .emit(ChannelEvent::Typing {
                match_id: self.match_id.clone(),
                user_id: self.my_profile_id.clone(),
                is_typing,
            })
            .await;
        if let Err(e) = result {
            debug!("typing broadcast skipped: {}", e);
        }
    }

    /// Durable mark-read plus a best-effort channel announcement so the
    /// peer's delivery state updates without a refetch.
    async fn mark_read(&self) {
        let now = Utc::now();
        self.state.write().await.messages.iter_mut().for_each(|m| {
            if m.sender_id != self.my_profile_id && m.read_at.is_none() {
                m.read_at = Some(now);
            }
        });

        if let Err(e) = self.backend.mark_messages_read(&self.match_id).await {
            warn!("mark read failed for chat {}: {}", self.match_id, e);
        }
        self.board.mark_read(&self.match_id).await;

        // Best-effort announcement; failure is silently ignored.
        let _ = self
            .channel
            .emit(ChannelEvent::ReadReceipt {
                match_id: self.match_id.clone(),
                reader_id: self.my_profile_id.clone(),
            })
            .await;
    }

    async fn attach_listeners(&self) {
        let mut registered = Vec::new();

        let state = self.state.clone();
        let board = self.board.clone();
        let me = self.my_profile_id.clone();
        let match_id = self.match_id.clone();
        let id = self
            .channel
            .on(ChannelEventKind::NewMessage, move |event| {
                let state = state.clone();
                let board = board.clone();
                let me = me.clone();
                let match_id = match_id.clone();
                async move {
                    let ChannelEvent::NewMessage { mut message } = event else {
                        return;
                    };
                    if message.match_id != match_id || message.sender_id == me {
                        return;
                    }
                    message.delivered = true;
                    let sent_at = message.sent_at;
                    {
                        let mut state = state.write().await;
                        if state.messages.iter().any(|m| m.id == message.id) {
                            return;
                        }
                        state.messages.push(message);
                        state.peer_typing = false;
                    }
                    board.touch_last_message(&match_id, sent_at).await;
                }
                .boxed()
            })
            .await;
        registered.push((ChannelEventKind::NewMessage, id));

        let state = self.state.clone();
        let me = self.my_profile_id.clone();
        let match_id = self.match_id.clone();
        let id = self
            .channel
            .on(ChannelEventKind::Typing, move |event| {
                let state = state.clone();
                let me = me.clone();
                let match_id = match_id.clone();
                async move {
                    let ChannelEvent::Typing {
                        match_id: room,
                        user_id,
                        is_typing,
                    } = event
                    else {
                        return;
                    };
                    if room == match_id && user_id != me {
                        state.write().await.peer_typing = is_typing;
                    }
                }
                .boxed()
            })
            .await;
        registered.push((ChannelEventKind::Typing, id));

        let state = self.state.clone();
        let me = self.my_profile_id.clone();
        let match_id = self.match_id.clone();
        let id = self
            .channel
            .on(ChannelEventKind::ReadReceipt, move |event| {
                let state = state.clone();
                let me = me.clone();
                let match_id = match_id.clone();
                async move {
                    let ChannelEvent::ReadReceipt {
                        match_id: room,
                        reader_id,
                    } = event
                    else {
                        return;
                    };
                    if room != match_id || reader_id == me {
                        return;
                    }
                    let now = Utc::now();
                    state.write().await.messages.iter_mut().for_each(|m| {
                        if m.sender_id == me && m.read_at.is_none() {
                            m.read_at = Some(now);
                            m.delivered = true;
                        }
                    });
                }
                .boxed()
            })
            .await;
        registered.push((ChannelEventKind::ReadReceipt, id));

        self.listeners.write().await.extend(registered);
    }
}
