//! Broadcast coordinator: turns one connection's event into registry calls and decides what
//! goes out and to whom. It never touches sockets; the caller delivers the returned `Dispatch`.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ChatError;
use crate::metrics::Metrics;
use crate::presence::{ConnectionId, PresenceRegistry};
use crate::protocol::{InboundEvent, OutboundEvent};

/// Who receives an outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Only(ConnectionId),
    AllExcept(ConnectionId),
}

impl Audience {
    pub fn includes(&self, conn: ConnectionId) -> bool {
        match *self {
            Audience::All => true,
            Audience::Only(id) => id == conn,
            Audience::AllExcept(id) => id != conn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub audience: Audience,
    pub event: OutboundEvent,
}

impl Dispatch {
    fn new(audience: Audience, event: OutboundEvent) -> Self {
        Self { audience, event }
    }
}

pub struct Coordinator {
    presence: Arc<PresenceRegistry>,
    metrics: Metrics,
    max_message_len: usize,
}

impl Coordinator {
    pub fn new(presence: Arc<PresenceRegistry>, metrics: Metrics, max_message_len: usize) -> Self {
        Self {
            presence,
            metrics,
            max_message_len,
        }
    }

    /// Handle one inbound event. `Ping` is only counted; the transport sends the pong.
    pub fn handle(&self, conn: ConnectionId, event: InboundEvent) -> Option<Dispatch> {
        self.metrics
            .events_total
            .with_label_values(&[event.name()])
            .inc();
        match event {
            InboundEvent::Join { username } => Some(self.join(conn, &username)),
            InboundEvent::SendMessage { message, .. } => Some(self.send_message(conn, &message)),
            InboundEvent::Leave => self.leave(conn),
            InboundEvent::Ping => None,
        }
    }

    /// Success goes to everyone, including the joiner; failure only to the joiner.
    pub fn join(&self, conn: ConnectionId, raw_name: &str) -> Dispatch {
        match self.presence.add(conn, raw_name) {
            Ok(user) => {
                info!(conn_id = conn, username = %user.username, "participant joined");
                self.metrics.participants_active.inc();
                Dispatch::new(Audience::All, OutboundEvent::joined(user))
            }
            Err(e) => {
                self.record_error(conn, &e);
                Dispatch::new(Audience::Only(conn), OutboundEvent::join_failed(&e))
            }
        }
    }

    /// The sender name always comes from the registry.
    pub fn send_message(&self, conn: ConnectionId, body: &str) -> Dispatch {
        match self.validate_message(conn, body) {
            Ok(username) => {
                debug!(conn_id = conn, %username, "message broadcast");
                Dispatch::new(
                    Audience::All,
                    OutboundEvent::NewMessage {
                        username,
                        message: body.to_string(),
                    },
                )
            }
            Err(e) => {
                self.record_error(conn, &e);
                Dispatch::new(Audience::Only(conn), OutboundEvent::error(&e))
            }
        }
    }

    fn validate_message(&self, conn: ConnectionId, body: &str) -> Result<String, ChatError> {
        let sender = self.presence.get(conn).ok_or(ChatError::NotRegistered)?;
        if body.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if body.chars().count() > self.max_message_len {
            return Err(ChatError::MessageTooLong {
                max: self.max_message_len,
            });
        }
        Ok(sender.username)
    }

    /// Explicit leave. Nothing is sent if the connection had no participant.
    pub fn leave(&self, conn: ConnectionId) -> Option<Dispatch> {
        let user = self.presence.remove(conn)?;
        info!(conn_id = conn, username = %user.username, "participant left");
        self.metrics.participants_active.dec();
        Some(Dispatch::new(
            Audience::AllExcept(conn),
            OutboundEvent::Leave {
                username: user.username,
            },
        ))
    }

    /// Transport-detected close. Same effect as `leave`; safe after a leave already ran.
    pub fn disconnect(&self, conn: ConnectionId) -> Option<Dispatch> {
        self.metrics
            .events_total
            .with_label_values(&["disconnect"])
            .inc();
        self.leave(conn)
    }

    /// Count and log an error answered to the originating connection.
    pub fn record_error(&self, conn: ConnectionId, err: &ChatError) {
        debug!(conn_id = conn, error = err.kind(), "event rejected");
        self.metrics
            .event_errors_total
            .with_label_values(&[err.kind()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JoinPayload;

    fn coordinator() -> Coordinator {
        Coordinator::new(
            Arc::new(PresenceRegistry::new()),
            Metrics::new().unwrap(),
            20,
        )
    }

    #[test]
    fn join_success_goes_to_everyone() {
        let c = coordinator();
        let d = c.join(1, "bob");
        assert_eq!(d.audience, Audience::All);
        match d.event {
            OutboundEvent::Join(JoinPayload {
                error: None,
                user: Some(user),
            }) => {
                assert_eq!(user.id, 1);
                assert_eq!(user.username, "bob");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn name_collision_goes_only_to_requester() {
        let c = coordinator();
        c.join(1, "bob");
        let d = c.join(2, "Bob");
        assert_eq!(d.audience, Audience::Only(2));
        assert_eq!(d.event, OutboundEvent::join_failed(&ChatError::NameTaken));
        assert_eq!(c.presence.len(), 1);
    }

    #[test]
    fn failed_join_can_retry_with_other_name() {
        let c = coordinator();
        c.join(1, "bob");
        assert_eq!(c.join(2, " BOB").audience, Audience::Only(2));
        assert_eq!(c.join(2, "robert").audience, Audience::All);
        assert_eq!(c.presence.len(), 2);
    }

    #[test]
    fn message_uses_registry_name() {
        let c = coordinator();
        c.join(1, "bob");
        let d = c
            .handle(
                1,
                InboundEvent::SendMessage {
                    username: Some("mallory".into()),
                    message: "hi".into(),
                },
            )
            .unwrap();
        assert_eq!(d.audience, Audience::All);
        assert_eq!(
            d.event,
            OutboundEvent::NewMessage {
                username: "bob".into(),
                message: "hi".into()
            }
        );
    }

    #[test]
    fn message_before_join_is_rejected() {
        let c = coordinator();
        let d = c.send_message(7, "hi");
        assert_eq!(d.audience, Audience::Only(7));
        assert_eq!(d.event, OutboundEvent::error(&ChatError::NotRegistered));
    }

    #[test]
    fn blank_and_oversized_messages_are_rejected() {
        let c = coordinator();
        c.join(1, "bob");
        assert_eq!(
            c.send_message(1, "   ").event,
            OutboundEvent::error(&ChatError::EmptyMessage)
        );
        assert_eq!(
            c.send_message(1, &"x".repeat(21)).event,
            OutboundEvent::error(&ChatError::MessageTooLong { max: 20 })
        );
        assert_eq!(c.send_message(1, &"x".repeat(20)).audience, Audience::All);
    }

    #[test]
    fn disconnect_broadcasts_leave_to_others() {
        let c = coordinator();
        c.join(1, "bob");
        let d = c.disconnect(1).unwrap();
        assert_eq!(d.audience, Audience::AllExcept(1));
        assert_eq!(
            d.event,
            OutboundEvent::Leave {
                username: "bob".into()
            }
        );
        assert!(c.presence.is_empty());
    }

    #[test]
    fn leave_then_disconnect_sends_once() {
        let c = coordinator();
        c.join(1, "bob");
        assert!(c.handle(1, InboundEvent::Leave).is_some());
        assert!(c.disconnect(1).is_none());
    }

    #[test]
    fn unregistered_leave_is_silent() {
        let c = coordinator();
        assert!(c.leave(3).is_none());
        assert!(c.handle(3, InboundEvent::Ping).is_none());
    }

    #[test]
    fn ping_is_counted_without_dispatch() {
        let c = coordinator();
        assert!(c.handle(1, InboundEvent::Ping).is_none());
        assert!(c.handle(1, InboundEvent::Ping).is_none());
        assert_eq!(c.metrics.events_total.with_label_values(&["ping"]).get(), 2);
        assert!(c.presence.is_empty());
    }

    #[test]
    fn audience_membership() {
        assert!(Audience::All.includes(4));
        assert!(Audience::Only(4).includes(4));
        assert!(!Audience::Only(4).includes(5));
        assert!(!Audience::AllExcept(4).includes(4));
        assert!(Audience::AllExcept(4).includes(5));
    }

    #[test]
    fn participant_gauge_tracks_membership() {
        let c = coordinator();
        c.join(1, "a");
        c.join(2, "b");
        c.join(3, "A");
        c.leave(1);
        assert_eq!(c.metrics.participants_active.get(), 1);
    }
}
