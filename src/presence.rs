//! Presence registry: the set of joined participants keyed by connection id, with case-insensitive name uniqueness.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::error::ChatError;

/// Transport-assigned id of a live connection.
pub type ConnectionId = u64;

/// A joined chat identity. `username` keeps the user's casing; uniqueness uses `normalize_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    #[serde(serialize_with = "crate::serde_id_string::serialize")]
    pub id: ConnectionId,
    pub username: String,
}

/// Trim and case-fold. Only used for comparing names.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Shared participant table. Every mutation takes the write lock, so the uniqueness check
/// and the insert in `add` are one atomic step.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: RwLock<HashMap<ConnectionId, Participant>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // The map is only touched through whole insert/remove calls, so a poisoned lock still holds a valid map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Participant>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Participant>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `id` under `raw_name`. Fails without touching the registry on an empty name,
    /// a case-insensitive collision, or a connection that already joined.
    pub fn add(&self, id: ConnectionId, raw_name: &str) -> Result<Participant, ChatError> {
        let username = raw_name.trim();
        if username.is_empty() {
            return Err(ChatError::InvalidName);
        }
        let normalized = normalize_name(username);

        let mut map = self.write();
        if map.contains_key(&id) {
            return Err(ChatError::AlreadyJoined);
        }
        if name_in_use(&map, &normalized) {
            return Err(ChatError::NameTaken);
        }
        let participant = Participant {
            id,
            username: username.to_string(),
        };
        map.insert(id, participant.clone());
        Ok(participant)
    }

    /// Remove the participant for `id`. Returns `None` if it was never added or is already gone.
    pub fn remove(&self, id: ConnectionId) -> Option<Participant> {
        self.write().remove(&id)
    }

    /// Whether any participant's normalized name equals `normalized`.
    pub fn contains(&self, normalized: &str) -> bool {
        name_in_use(&self.read(), normalized)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Participant> {
        self.read().get(&id).cloned()
    }

    /// Consistent copy of all participants, ordered by connection id.
    pub fn snapshot(&self) -> Vec<Participant> {
        let mut all: Vec<Participant> = self.read().values().cloned().collect();
        all.sort_by_key(|p| p.id);
        all
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn name_in_use(map: &HashMap<ConnectionId, Participant>, normalized: &str) -> bool {
    map.values().any(|p| normalize_name(&p.username) == normalized)
}
