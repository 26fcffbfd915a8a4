//! WebSocket wire messages

use crate::status::{StatusDelta, StatusFields};
use serde::{Deserialize, Serialize};

/// Messages from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with the admin key
    Auth { token: String },
    /// Start a publication
    Subscribe { name: String },
    /// Stop a publication
    Unsubscribe { name: String },
    /// Ping for keepalive
    Ping { seq: u64 },
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication successful
    AuthOk,
    /// Authentication failed
    AuthError { message: String },
    /// Full record, sent once per subscription
    Added {
        collection: String,
        id: String,
        fields: StatusFields,
    },
    /// Changed fields of a record
    Changed {
        collection: String,
        id: String,
        fields: StatusDelta,
    },
    /// Initial data for a publication has been sent
    Ready { name: String },
    /// Subscription refused
    SubscribeError { name: String, message: String },
    /// Unsubscription confirmed
    Unsubscribed { name: String },
    /// Pong response
    Pong { seq: u64 },
    /// Generic error
    Error { message: String },
}
