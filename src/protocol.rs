//! Wire events exchanged over the WebSocket as `{"type": ..., "payload": ...}` JSON text frames.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::presence::Participant;

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum InboundEvent {
    Join {
        #[serde(default)]
        username: String,
    },
    /// `username` is accepted for compatibility but never trusted; the sender comes from the registry.
    SendMessage {
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        message: String,
    },
    Leave,
    Ping,
}

impl InboundEvent {
    pub fn parse(text: &str) -> Result<Self, ChatError> {
        serde_json::from_str(text).map_err(|_| ChatError::MalformedEvent)
    }

    /// Label used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Join { .. } => "join",
            InboundEvent::SendMessage { .. } => "sendMessage",
            InboundEvent::Leave => "leave",
            InboundEvent::Ping => "ping",
        }
    }
}

/// Result of a join attempt. Exactly one of `error` / `user` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Participant>,
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OutboundEvent {
    Join(JoinPayload),
    NewMessage { username: String, message: String },
    Leave { username: String },
    Error { error: String },
    Pong,
}

impl OutboundEvent {
    pub fn joined(user: Participant) -> Self {
        OutboundEvent::Join(JoinPayload {
            error: None,
            user: Some(user),
        })
    }

    pub fn join_failed(err: &ChatError) -> Self {
        OutboundEvent::Join(JoinPayload {
            error: Some(err.to_string()),
            user: None,
        })
    }

    pub fn error(err: &ChatError) -> Self {
        OutboundEvent::Error {
            error: err.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
