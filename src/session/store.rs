//! Single-use nonce store with TTL semantics.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

use crate::observability::metrics;

/// Current unix time in seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Transient state recorded when a token is minted, keyed by its nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrSession {
    pub consumer_id: String,
    pub month_id: u32,
    /// Unix seconds; mirrors the token's `exp` claim.
    pub expires_at: u64,
}

impl QrSession {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Result of attempting to consume a nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// First valid presentation; the session is returned and invalidated.
    Consumed(QrSession),
    /// The nonce was consumed by an earlier presentation.
    AlreadyUsed,
    /// The nonce was never recorded (or was swept after expiry).
    Unknown,
    /// The nonce was recorded but its TTL has elapsed.
    Expired,
}

/// Thread-safe store of active and consumed nonces.
///
/// `active` holds sessions awaiting their first presentation. `used` holds
/// tombstones for consumed nonces until their original expiry passes, so a
/// replay within the token window is distinguishable from garbage input.
#[derive(Clone, Default)]
pub struct SessionStore {
    active: Arc<DashMap<String, QrSession>>,
    used: Arc<DashMap<String, u64>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly minted session under its nonce.
    pub fn record(&self, nonce: &str, session: QrSession) {
        self.active.insert(nonce.to_string(), session);
    }

    /// Consume a nonce, at most once across all concurrent callers.
    ///
    /// The removal from `active` is the single atomic decision point:
    /// concurrent presentations of the same nonce race on it, and exactly
    /// one observes the session.
    pub fn consume(&self, nonce: &str) -> ConsumeOutcome {
        if self.used.contains_key(nonce) {
            return ConsumeOutcome::AlreadyUsed;
        }
        match self.active.remove(nonce) {
            Some((key, session)) => {
                let now = now_unix();
                if session.is_expired(now) {
                    // Dead on arrival; no tombstone needed.
                    return ConsumeOutcome::Expired;
                }
                self.used.insert(key, session.expires_at);
                ConsumeOutcome::Consumed(session)
            }
            None => ConsumeOutcome::Unknown,
        }
    }

    /// Drop expired sessions and stale tombstones. Returns how many
    /// entries were removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_unix();
        let before = self.active.len() + self.used.len();
        self.active.retain(|_, session| !session.is_expired(now));
        self.used.retain(|_, expires_at| *expires_at > now);
        before - (self.active.len() + self.used.len())
    }

    /// Counts of (active, consumed) entries for the admin view.
    pub fn summary(&self) -> (usize, usize) {
        (self.active.len(), self.used.len())
    }
}

/// Periodically purge expired sessions until shutdown.
pub async fn run_sweeper(
    store: SessionStore,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let swept = store.purge_expired();
                if swept > 0 {
                    metrics::record_sessions_swept(swept);
                    tracing::debug!(swept, "Expired QR sessions purged");
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("Session sweeper stopping");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: u64) -> QrSession {
        QrSession {
            consumer_id: "consumer:acme-1".to_string(),
            month_id: 202509,
            expires_at,
        }
    }

    #[test]
    fn test_consume_once() {
        let store = SessionStore::new();
        store.record("0xabc", session(now_unix() + 60));

        assert!(matches!(store.consume("0xabc"), ConsumeOutcome::Consumed(_)));
        assert_eq!(store.consume("0xabc"), ConsumeOutcome::AlreadyUsed);
    }

    #[test]
    fn test_unknown_nonce() {
        let store = SessionStore::new();
        assert_eq!(store.consume("0xmissing"), ConsumeOutcome::Unknown);
    }

    #[test]
    fn test_expired_session() {
        let store = SessionStore::new();
        store.record("0xold", session(now_unix().saturating_sub(10)));
        assert_eq!(store.consume("0xold"), ConsumeOutcome::Expired);
        // Expired sessions never become tombstones.
        assert_eq!(store.consume("0xold"), ConsumeOutcome::Unknown);
    }

    #[test]
    fn test_purge_expired() {
        let store = SessionStore::new();
        store.record("0xlive", session(now_unix() + 60));
        store.record("0xdead", session(now_unix().saturating_sub(10)));
        assert!(matches!(store.consume("0xlive"), ConsumeOutcome::Consumed(_)));

        // The live tombstone survives, the dead active entry does not.
        let swept = store.purge_expired();
        assert_eq!(swept, 1);
        assert_eq!(store.summary(), (0, 1));
    }

    #[test]
    fn test_concurrent_consume_single_winner() {
        let store = SessionStore::new();
        store.record("0xrace", session(now_unix() + 60));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || store.consume("0xrace")));
        }
        let outcomes: Vec<ConsumeOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = outcomes
            .iter()
            .filter(|o| matches!(o, ConsumeOutcome::Consumed(_)))
            .count();
        assert_eq!(winners, 1);
    }
}
