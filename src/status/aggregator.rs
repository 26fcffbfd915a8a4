//! Incremental distinct-count aggregation over session events
//!
//! Each user and each grain maps to the set of session digests currently
//! attributed to it. A key exists only while its set is non-empty, so the
//! number of keys is the number of active users (or grains).

use crate::sessions::{Session, SessionEvent};
use crate::status::{StatusDelta, StatusFields};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// SHA-256 digest of a session id
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHash([u8; 32]);

impl SessionHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SessionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD.encode(self.0))
    }
}

impl fmt::Debug for SessionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionHash({})", self)
    }
}

/// Hash a raw session id; raw ids are never retained
pub fn hash_session_id(session_id: &str) -> SessionHash {
    SessionHash(Sha256::digest(session_id.as_bytes()).into())
}

/// Per-subscription aggregation state
#[derive(Debug, Default)]
pub struct AggregationState {
    users_index: HashMap<String, HashSet<SessionHash>>,
    grains_index: HashMap<String, HashSet<SessionHash>>,
    user_count: u64,
    grain_count: u64,
}

impl AggregationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusFields {
        StatusFields {
            active_users: self.user_count,
            active_grains: self.grain_count,
        }
    }

    pub fn active_users(&self) -> u64 {
        self.user_count
    }

    pub fn active_grains(&self) -> u64 {
        self.grain_count
    }

    /// True when no session is tracked at all
    pub fn is_empty(&self) -> bool {
        self.users_index.is_empty() && self.grains_index.is_empty()
    }

    /// Whether the user currently has a live session
    pub fn has_user(&self, user_id: &str) -> bool {
        self.users_index.contains_key(user_id)
    }

    /// Whether the grain currently has a live session
    pub fn has_grain(&self, grain_id: &str) -> bool {
        self.grains_index.contains_key(grain_id)
    }

    /// Apply one event, returning the delta to publish if any count moved
    pub fn apply(&mut self, event: &SessionEvent) -> Option<StatusDelta> {
        match event {
            SessionEvent::Added(session) => self.on_added(session),
            SessionEvent::Removed(session) => self.on_removed(session),
        }
    }

    pub fn on_added(&mut self, session: &Session) -> Option<StatusDelta> {
        let hash = hash_session_id(&session.session_id);
        let mut delta = StatusDelta::default();

        if let Some(user_id) = session.owner() {
            if track(&mut self.users_index, user_id, hash) {
                self.user_count += 1;
                delta.active_users = Some(self.user_count);
            }
        }

        if session.grain_id.is_empty() {
            debug!(session = %hash, "Session added without grain id");
        } else if track(&mut self.grains_index, &session.grain_id, hash) {
            self.grain_count += 1;
            delta.active_grains = Some(self.grain_count);
        }

        (!delta.is_empty()).then_some(delta)
    }

    pub fn on_removed(&mut self, session: &Session) -> Option<StatusDelta> {
        let hash = hash_session_id(&session.session_id);
        let mut delta = StatusDelta::default();

        if let Some(user_id) = session.owner() {
            if untrack(&mut self.users_index, user_id, &hash) {
                self.user_count -= 1;
                delta.active_users = Some(self.user_count);
            }
        }

        if session.grain_id.is_empty() {
            debug!(session = %hash, "Session removed without grain id");
        } else if untrack(&mut self.grains_index, &session.grain_id, &hash) {
            self.grain_count -= 1;
            delta.active_grains = Some(self.grain_count);
        }

        (!delta.is_empty()).then_some(delta)
    }
}

/// Insert `hash` under `key`; true if the key just became active
fn track(index: &mut HashMap<String, HashSet<SessionHash>>, key: &str, hash: SessionHash) -> bool {
    match index.get_mut(key) {
        Some(set) => {
            set.insert(hash);
            false
        }
        None => {
            index.insert(key.to_string(), HashSet::from([hash]));
            true
        }
    }
}

/// Remove `hash` from `key`; true if the key just became inactive
fn untrack(index: &mut HashMap<String, HashSet<SessionHash>>, key: &str, hash: &SessionHash) -> bool {
    let Some(set) = index.get_mut(key) else {
        return false;
    };

    if !set.remove(hash) || !set.is_empty() {
        return false;
    }

    index.remove(key);
    true
}
