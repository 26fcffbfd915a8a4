//! Session lifecycle events
//!
//! A session store announces every live session once when an observer
//! registers (replay), then reports creations and deletions as they happen.
//! Events for one session id always arrive add-before-remove.

mod memory;

pub use memory::MemorySessionStore;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A live session as reported by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque unique session id
    pub session_id: String,
    /// Owning user, absent for anonymous sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Grain this session is attached to
    pub grain_id: String,
}

impl Session {
    pub fn new(session_id: impl Into<String>, grain_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            grain_id: grain_id.into(),
        }
    }

    /// Attribute the session to a user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// The owning user, treating an empty id as anonymous
    pub fn owner(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|u| !u.is_empty())
    }
}

/// A change reported by a [`SessionSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Added(Session),
    Removed(Session),
}

impl SessionEvent {
    pub fn session(&self) -> &Session {
        match self {
            SessionEvent::Added(s) | SessionEvent::Removed(s) => s,
        }
    }
}

/// Anything that can stream session lifecycle events
pub trait SessionSource: Send + Sync {
    /// Register a new observer.
    ///
    /// The returned receiver yields an `Added` for every session live at
    /// registration time before any later event.
    fn observe(&self) -> SessionObserver;
}

/// An observer registration: the event stream plus its teardown handle
pub struct SessionObserver {
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub handle: ObserveHandle,
}

/// Releases an observer registration in the store.
///
/// Stopping is idempotent and also happens on drop.
pub struct ObserveHandle {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl ObserveHandle {
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    /// A handle with nothing to release
    pub fn noop() -> Self {
        Self { stop: None }
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_none()
    }
}

impl Drop for ObserveHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ObserveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserveHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
