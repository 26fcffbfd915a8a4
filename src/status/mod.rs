//! Live system status
//!
//! One status record (`systemStatus` / `globalStatus`) holding the number of
//! distinct users and grains with at least one live session. Subscribers get
//! the full record once, then only the fields that changed.

mod aggregator;
mod feed;

pub use aggregator::{hash_session_id, AggregationState, SessionHash};
pub use feed::{subscribe, StatusSubscription, SubscriptionHandle};

use serde::{Deserialize, Serialize};

/// Publication and collection name of the status record
pub const STATUS_COLLECTION: &str = "systemStatus";

/// Row id of the single status record
pub const STATUS_ROW_ID: &str = "globalStatus";

/// The full status record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFields {
    pub active_users: u64,
    pub active_grains: u64,
}

impl StatusFields {
    /// Fold a delta into the record
    pub fn apply(&mut self, delta: &StatusDelta) {
        if let Some(users) = delta.active_users {
            self.active_users = users;
        }
        if let Some(grains) = delta.active_grains {
            self.active_grains = grains;
        }
    }
}

/// A partial update carrying only the fields that changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_users: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_grains: Option<u64>,
}

impl StatusDelta {
    pub fn is_empty(&self) -> bool {
        self.active_users.is_none() && self.active_grains.is_none()
    }

    /// Fold a later delta into this one. Values are absolute, so the later one wins.
    pub fn merge(&mut self, later: &StatusDelta) {
        if later.active_users.is_some() {
            self.active_users = later.active_users;
        }
        if later.active_grains.is_some() {
            self.active_grains = later.active_grains;
        }
    }
}
