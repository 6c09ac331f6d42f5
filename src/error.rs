/// Error types for the EvenLove core
use thiserror::Error;

/// Failure taxonomy for session, swipe, channel and chat operations.
///
/// Variants carry plain strings so the enum stays `Clone` and results can
/// flow through the shared single-flight initialization future.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvenLoveError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("validation failure: {0}")]
    Validation(String),

    #[error("channel connect failure: {0}")]
    ChannelConnect(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("swipe error: {0}")]
    Swipe(String),

    #[error("chat error: {0}")]
    Chat(String),
}

impl EvenLoveError {
    /// User-displayable message stored into a resource's error state.
    pub fn user_message(&self) -> String {
        match self {
            EvenLoveError::NotFound(_) => "Nothing here yet.".to_string(),
            EvenLoveError::Forbidden(_) => {
                "You don't have access to this event.".to_string()
            }
            EvenLoveError::Unauthorized(_) => "Please sign in again.".to_string(),
            EvenLoveError::NetworkUnreachable(_) => {
                "No connection. Check your network and try again.".to_string()
            }
            EvenLoveError::Validation(msg) => msg.clone(),
            EvenLoveError::ChannelConnect(_) => {
                "Live updates are unavailable right now.".to_string()
            }
            EvenLoveError::Serialization(_)
            | EvenLoveError::Swipe(_)
            | EvenLoveError::Chat(_) => "Something went wrong. Try again.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EvenLoveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_classification() {
        let err = EvenLoveError::Unauthorized("token expired".to_string());
        assert_eq!(err.user_message(), "Please sign in again.");

        let err = EvenLoveError::Validation("Age must be at least 18".to_string());
        assert_eq!(err.user_message(), "Age must be at least 18");
    }
}
