//! Error types: user-facing chat errors returned to the originating connection, and startup config errors.

use thiserror::Error;

/// Recoverable, per-connection errors. The `Display` text is what the client sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Username empty or whitespace-only after trimming.
    #[error("Username is required.")]
    InvalidName,

    /// Another participant already holds this name (case-insensitive).
    #[error("This username already exists.")]
    NameTaken,

    /// The connection already has a participant.
    #[error("You have already joined the chat.")]
    AlreadyJoined,

    /// Message sent before a successful join.
    #[error("Join the chat before sending messages.")]
    NotRegistered,

    #[error("Message cannot be empty.")]
    EmptyMessage,

    #[error("Message is longer than {max} characters.")]
    MessageTooLong { max: usize },

    /// Frame could not be parsed as an inbound event.
    #[error("Unrecognized event.")]
    MalformedEvent,
}

impl ChatError {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::InvalidName => "invalid_name",
            ChatError::NameTaken => "name_taken",
            ChatError::AlreadyJoined => "already_joined",
            ChatError::NotRegistered => "not_registered",
            ChatError::EmptyMessage => "empty_message",
            ChatError::MessageTooLong { .. } => "message_too_long",
            ChatError::MalformedEvent => "malformed_event",
        }
    }
}

/// Invalid environment configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_client_wording() {
        assert_eq!(ChatError::InvalidName.to_string(), "Username is required.");
        assert_eq!(ChatError::NameTaken.to_string(), "This username already exists.");
        assert_eq!(
            ChatError::MessageTooLong { max: 10 }.to_string(),
            "Message is longer than 10 characters."
        );
    }

    #[test]
    fn kinds_are_snake_case_labels() {
        assert_eq!(ChatError::NotRegistered.kind(), "not_registered");
        assert_eq!(ChatError::MessageTooLong { max: 1 }.kind(), "message_too_long");
    }
}
