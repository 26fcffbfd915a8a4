//! Status subscriptions
//!
//! Each subscription owns its own [`AggregationState`] and a single task
//! that applies session events in arrival order. Deltas go out on an
//! unbounded channel so a slow reader never stalls ingestion.

use crate::sessions::{SessionObserver, SessionSource};
use crate::status::{AggregationState, StatusDelta, StatusFields};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// A live status subscription
pub struct StatusSubscription {
    snapshot: StatusFields,
    deltas: mpsc::UnboundedReceiver<StatusDelta>,
    handle: SubscriptionHandle,
}

impl StatusSubscription {
    /// The initial record; always zero, sessions arrive as replayed adds
    pub fn snapshot(&self) -> StatusFields {
        self.snapshot
    }

    /// Wait for the next delta. `None` once the subscription has ended.
    pub async fn next_delta(&mut self) -> Option<StatusDelta> {
        self.deltas.recv().await
    }

    /// Take a delta if one is already queued
    pub fn try_next_delta(&mut self) -> Option<StatusDelta> {
        self.deltas.try_recv().ok()
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn unsubscribe(&self) {
        self.handle.unsubscribe();
    }
}

/// Cancels a subscription from anywhere
#[derive(Clone)]
pub struct SubscriptionHandle {
    stop: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    finished: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Stop the subscription. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
    }

    /// True once the processing task has exited and released the source
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Start a status subscription over `source`.
///
/// Must be called from within a tokio runtime.
pub fn subscribe(source: &dyn SessionSource) -> StatusSubscription {
    let observer = source.observe();
    let (delta_tx, delta_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();
    let finished = Arc::new(AtomicBool::new(false));

    tokio::spawn(run(observer, delta_tx, stop_rx, finished.clone()));

    StatusSubscription {
        snapshot: StatusFields::default(),
        deltas: delta_rx,
        handle: SubscriptionHandle {
            stop: Arc::new(Mutex::new(Some(stop_tx))),
            finished,
        },
    }
}

async fn run(
    observer: SessionObserver,
    deltas: mpsc::UnboundedSender<StatusDelta>,
    mut stop: oneshot::Receiver<()>,
    finished: Arc<AtomicBool>,
) {
    let SessionObserver { mut events, mut handle } = observer;
    let mut state = AggregationState::new();

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => {
                debug!("Status subscription cancelled");
                break;
            }
            _ = deltas.closed() => {
                debug!("Status subscriber went away");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Session source closed");
                    break;
                };
                if let Some(delta) = state.apply(&event) {
                    if deltas.send(delta).is_err() {
                        break;
                    }
                }
            }
        }
    }

    handle.stop();
    drop(state);
    finished.store(true, Ordering::Release);
}
