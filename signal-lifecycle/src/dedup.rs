//! At-most-once notification.
//!
//! The marker is claimed before sending and released only when the send
//! fails. A process crash between a successful send and the caller's next
//! step leaves the marker in place, so that signal is never re-sent.

use crate::notifier::Notifier;
use crate::storage::DedupStore;
use anyhow::{Context, Result};
use common::DedupKey;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// Another caller already claimed this signal.
    Duplicate,
    /// The send failed. `released` is false when the marker could not be removed.
    Failed { reason: String, released: bool },
}

impl NotifyOutcome {
    pub fn describe(&self) -> String {
        match self {
            NotifyOutcome::Sent => "notified".to_string(),
            NotifyOutcome::Duplicate => "already notified".to_string(),
            NotifyOutcome::Failed { reason, released } => {
                format!("notification failed ({}), marker released: {}", reason, released)
            }
        }
    }
}

/// Claim, send, compensate.
pub struct NotificationGate {
    dedup: Arc<dyn DedupStore>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationGate {
    pub fn new(dedup: Arc<dyn DedupStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { dedup, notifier }
    }

    /// Errors only when the claim itself cannot be made.
    pub async fn notify(&self, key: &DedupKey, text: &str, image: Option<&[u8]>) -> Result<NotifyOutcome> {
        let claimed = self
            .dedup
            .claim(key)
            .await
            .with_context(|| format!("Failed to claim notification {}", key))?;
        if !claimed {
            debug!("Skipping duplicate notification {}", key);
            return Ok(NotifyOutcome::Duplicate);
        }

        let reason = match self.notifier.send(text, image).await {
            Ok(true) => {
                info!("Notification sent for {}", key);
                return Ok(NotifyOutcome::Sent);
            }
            Ok(false) => "channel rejected message".to_string(),
            Err(e) => format!("{:#}", e),
        };
        warn!("Notification failed for {}: {}", key, reason);

        let released = match self.dedup.release(key).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to release notification marker {}: {:#}", key, e);
                false
            }
        };
        Ok(NotifyOutcome::Failed { reason, released })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::storage::InMemoryStore;
    use common::SignalType;

    fn gate() -> (NotificationGate, Arc<InMemoryStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        (NotificationGate::new(store.clone(), notifier.clone()), store, notifier)
    }

    fn key() -> DedupKey {
        DedupKey::new("BTCUSDT", "15m", SignalType::Buy, 1_704_103_200_000)
    }

    #[tokio::test]
    async fn test_second_notify_is_duplicate() {
        let (gate, store, notifier) = gate();

        assert_eq!(gate.notify(&key(), "hello", None).await.unwrap(), NotifyOutcome::Sent);
        assert_eq!(gate.notify(&key(), "hello", None).await.unwrap(), NotifyOutcome::Duplicate);
        assert_eq!(notifier.sent().len(), 1);
        assert!(store.has_marker(&key()));
    }

    #[tokio::test]
    async fn test_failed_send_releases_marker() {
        let (gate, store, notifier) = gate();
        notifier.set_reject(true);

        let outcome = gate.notify(&key(), "hello", None).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Failed { released: true, .. }));
        assert!(!store.has_marker(&key()));

        // a later attempt may send again
        notifier.set_reject(false);
        assert_eq!(gate.notify(&key(), "hello", None).await.unwrap(), NotifyOutcome::Sent);
    }

    #[tokio::test]
    async fn test_send_error_releases_marker() {
        let (gate, store, notifier) = gate();
        notifier.set_error(true);

        let outcome = gate.notify(&key(), "hello", None).await.unwrap();
        match outcome {
            NotifyOutcome::Failed { reason, released } => {
                assert!(reason.contains("unavailable"));
                assert!(released);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!store.has_marker(&key()));
    }

    #[tokio::test]
    async fn test_release_failure_is_reported() {
        let (gate, store, notifier) = gate();
        notifier.set_reject(true);
        store.set_fail_releases(true);

        let outcome = gate.notify(&key(), "hello", None).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Failed { released: false, .. }));
        assert!(store.has_marker(&key()));
    }

    #[tokio::test]
    async fn test_concurrent_notifies_send_once() {
        let (gate, _store, notifier) = gate();
        let gate = Arc::new(gate);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.notify(&key(), "hello", None).await.unwrap() })
            })
            .collect();

        let mut sent = 0;
        for handle in handles {
            if handle.await.unwrap() == NotifyOutcome::Sent {
                sent += 1;
            }
        }
        assert_eq!(sent, 1);
        assert_eq!(notifier.sent().len(), 1);
    }
}
