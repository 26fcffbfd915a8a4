//! System status - live admin status feed and server log download tokens
//!
//! Aggregates session lifecycle events into the number of active users and
//! grains, published to administrators as an initial record followed by
//! minimal deltas. Server log downloads are gated by single-use tokens that
//! expire shortly after issue.

pub mod auth;
pub mod config;
pub mod server;
pub mod sessions;
pub mod status;

pub use auth::{AdminKey, DownloadToken, TokenBroker, Verdict};
pub use config::StatusServerConfig;
pub use server::StatusServer;
pub use sessions::{MemorySessionStore, Session, SessionEvent, SessionSource};
pub use status::{subscribe, AggregationState, StatusDelta, StatusFields, StatusSubscription};
