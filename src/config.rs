/// Session configuration
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one event session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a completed initialization stays fresh for the same event
    pub cache_ttl: Duration,

    /// Messages fetched per chat history page
    pub chat_page_size: u32,

    /// Idle time after which the typing indicator auto-clears
    pub typing_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5 * 60),
            chat_page_size: 30,
            typing_timeout: Duration::from_secs(3),
        }
    }
}
