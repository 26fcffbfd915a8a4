//! Single-use, time-boxed download tokens
//!
//! A token is removed by the first `consume` that sees it, whether or not
//! that call authorizes, so every token gets exactly one attempt.

use crate::auth::tokens::DownloadToken;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// How long an issued token stays redeemable
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Outcome of redeeming a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Authorized,
    /// Unknown, expired, or already consumed; deliberately not distinguished
    Rejected,
}

impl Verdict {
    pub fn is_authorized(self) -> bool {
        matches!(self, Verdict::Authorized)
    }
}

/// In-memory token store shared by issuers and consumers
pub struct TokenBroker {
    tokens: DashMap<String, Instant>,
    ttl: Duration,
    /// When `issue` last swept; at most one lazy sweep per TTL window
    last_sweep: Mutex<Instant>,
    sweeps: AtomicU64,
}

impl TokenBroker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl,
            last_sweep: Mutex::new(Instant::now()),
            sweeps: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token. Callers must have checked the requester is privileged.
    pub fn issue(&self) -> DownloadToken {
        self.sweep_if_due();

        let token = DownloadToken::generate();
        self.tokens.insert(token.as_str().to_string(), Instant::now());
        debug!(outstanding = self.tokens.len(), "Issued download token");
        token
    }

    /// Redeem a token, removing it regardless of the verdict
    pub fn consume(&self, token: &str) -> Verdict {
        let Some((_, issued_at)) = self.tokens.remove(token) else {
            return Verdict::Rejected;
        };

        if issued_at.elapsed() > self.ttl {
            debug!("Download token expired before use");
            return Verdict::Rejected;
        }

        Verdict::Authorized
    }

    /// Sweep unless one already ran within the last TTL
    fn sweep_if_due(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_sweep.lock();
            if now.duration_since(*last) < self.ttl {
                return;
            }
            *last = now;
        }
        self.sweep_expired();
    }

    /// Drop tokens past their TTL, returning how many were evicted
    pub fn sweep_expired(&self) -> usize {
        self.sweeps.fetch_add(1, Ordering::Relaxed);

        let before = self.tokens.len();
        let ttl = self.ttl;
        self.tokens.retain(|_, issued_at| issued_at.elapsed() <= ttl);
        let evicted = before.saturating_sub(self.tokens.len());

        if evicted > 0 {
            debug!(evicted, "Swept expired download tokens");
        }
        evicted
    }

    /// Tokens issued and not yet consumed or swept
    pub fn outstanding(&self) -> usize {
        self.tokens.len()
    }

    /// Full scans of the token map run so far
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }
}

impl Default for TokenBroker {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}
