//! In-process session registry

use crate::sessions::{ObserveHandle, Session, SessionEvent, SessionObserver, SessionSource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<String, Session>,
    observers: HashMap<Uuid, mpsc::UnboundedSender<SessionEvent>>,
}

impl StoreInner {
    fn notify(&mut self, event: SessionEvent) {
        // Observers whose receiver is gone are dropped here
        self.observers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// Live sessions held in memory, observable as a [`SessionSource`]
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session.
    ///
    /// Returns false when an identical session was already present. A
    /// different session under the same id is reported as a removal of the
    /// old one followed by an addition.
    pub fn insert(&self, session: Session) -> bool {
        let mut inner = self.inner.lock();

        match inner.sessions.get(&session.session_id).cloned() {
            Some(existing) if existing == session => return false,
            Some(existing) => inner.notify(SessionEvent::Removed(existing)),
            None => {}
        }

        inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        inner.notify(SessionEvent::Added(session));
        true
    }

    /// Delete a session, returning it if it was live
    pub fn remove(&self, session_id: &str) -> Option<Session> {
        let mut inner = self.inner.lock();
        let session = inner.sessions.remove(session_id)?;
        inner.notify(SessionEvent::Removed(session.clone()));
        Some(session)
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.inner.lock().sessions.get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

impl SessionSource for MemorySessionStore {
    fn observe(&self) -> SessionObserver {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        {
            let mut inner = self.inner.lock();
            for session in inner.sessions.values() {
                // Receiver is held right here, send cannot fail
                let _ = tx.send(SessionEvent::Added(session.clone()));
            }
            inner.observers.insert(id, tx);
            debug!(observer = %id, replayed = inner.sessions.len(), "Session observer registered");
        }

        let weak: Weak<Mutex<StoreInner>> = Arc::downgrade(&self.inner);
        let handle = ObserveHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().observers.remove(&id);
                debug!(observer = %id, "Session observer released");
            }
        });

        SessionObserver { events: rx, handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_observe_replays_live_sessions() {
        let store = MemorySessionStore::new();
        store.insert(Session::new("s1", "g1").with_user("u1"));
        store.insert(Session::new("s2", "g2"));

        let mut observer = store.observe();
        let events = drain(&mut observer.events);

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, SessionEvent::Added(_))));
        assert_eq!(store.observer_count(), 1);
    }

    #[test]
    fn test_live_events_follow_replay() {
        let store = MemorySessionStore::new();
        store.insert(Session::new("s1", "g1"));

        let mut observer = store.observe();
        store.insert(Session::new("s2", "g1"));
        store.remove("s1");

        let events = drain(&mut observer.events);
        assert_eq!(
            events,
            vec![
                SessionEvent::Added(Session::new("s1", "g1")),
                SessionEvent::Added(Session::new("s2", "g1")),
                SessionEvent::Removed(Session::new("s1", "g1")),
            ]
        );
    }

    #[test]
    fn test_identical_insert_is_silent() {
        let store = MemorySessionStore::new();
        let mut observer = store.observe();

        assert!(store.insert(Session::new("s1", "g1")));
        assert!(!store.insert(Session::new("s1", "g1")));

        assert_eq!(drain(&mut observer.events).len(), 1);
    }

    #[test]
    fn test_replacing_session_reports_remove_then_add() {
        let store = MemorySessionStore::new();
        store.insert(Session::new("s1", "g1"));
        let mut observer = store.observe();
        drain(&mut observer.events);

        store.insert(Session::new("s1", "g1").with_user("u1"));

        assert_eq!(
            drain(&mut observer.events),
            vec![
                SessionEvent::Removed(Session::new("s1", "g1")),
                SessionEvent::Added(Session::new("s1", "g1").with_user("u1")),
            ]
        );
    }

    #[test]
    fn test_remove_unknown_session() {
        let store = MemorySessionStore::new();
        let mut observer = store.observe();

        assert!(store.remove("missing").is_none());
        assert!(drain(&mut observer.events).is_empty());
    }

    #[test]
    fn test_stop_releases_registration() {
        let store = MemorySessionStore::new();
        let mut observer = store.observe();
        assert_eq!(store.observer_count(), 1);

        observer.handle.stop();
        assert_eq!(store.observer_count(), 0);

        store.insert(Session::new("s1", "g1"));
        assert!(drain(&mut observer.events).is_empty());
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let store = MemorySessionStore::new();
        let SessionObserver { events, handle } = store.observe();
        drop(events);
        std::mem::forget(handle);

        store.insert(Session::new("s1", "g1"));
        assert_eq!(store.observer_count(), 0);
    }
}
