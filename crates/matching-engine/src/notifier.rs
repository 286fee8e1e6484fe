//! Versioned change notification
//!
//! A [`ChangeNotifier`] holds the latest value of something together with a
//! monotonically increasing version. Consumers remember the last version
//! they saw and call [`ChangeNotifier::await_change`] to wait for a newer
//! one. Intermediate versions may be coalesced; a waiter always gets the
//! latest value, never a stale one.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MatchingError, Result};

/// A value stamped with the version it was published at
#[derive(Debug)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: Arc<T>,
}

impl<T> Clone for Versioned<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            value: Arc::clone(&self.value),
        }
    }
}

pub struct ChangeNotifier<T> {
    tx: watch::Sender<Versioned<T>>,
    closed: CancellationToken,
}

impl<T: Send + Sync + 'static> ChangeNotifier<T> {
    /// Start at version 0 with `initial`
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Versioned {
            version: 0,
            value: Arc::new(initial),
        });
        Self {
            tx,
            closed: CancellationToken::new(),
        }
    }

    pub fn current(&self) -> Versioned<T> {
        self.tx.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    /// Publish `value` as the next version and wake every waiter
    ///
    /// Returns the new version. Publishing after close is ignored.
    pub fn publish(&self, value: T) -> u64 {
        if self.closed.is_cancelled() {
            return self.version();
        }
        let mut published = 0;
        self.tx.send_modify(|current| {
            current.version += 1;
            current.value = Arc::new(value);
            published = current.version;
        });
        debug!(version = published, "Change published");
        published
    }

    /// Wait for a version newer than `since`
    ///
    /// Resolves immediately if one already exists. Fails with
    /// `NotifierClosed` once the notifier is closed.
    pub async fn await_change(&self, since: u64) -> Result<Versioned<T>> {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let current = rx.borrow_and_update();
                if current.version > since {
                    return Ok(current.clone());
                }
            }
            if self.closed.is_cancelled() {
                return Err(MatchingError::NotifierClosed);
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(MatchingError::NotifierClosed);
                    }
                }
                _ = self.closed.cancelled() => return Err(MatchingError::NotifierClosed),
            }
        }
    }

    /// Reject all current and future waiters
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_resolves_immediately_when_behind() {
        let notifier = ChangeNotifier::new("a");
        notifier.publish("b");

        let seen = notifier.await_change(0).await.unwrap();
        assert_eq!(seen.version, 1);
        assert_eq!(*seen.value, "b");
    }

    #[tokio::test]
    async fn test_waiters_share_one_publish() {
        let notifier = Arc::new(ChangeNotifier::new(0u32));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let n = notifier.clone();
                tokio::spawn(async move { n.await_change(0).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.publish(7);

        for waiter in waiters {
            let seen = waiter.await.unwrap().unwrap();
            assert_eq!(seen.version, 1);
            assert_eq!(*seen.value, 7);
        }
    }

    #[tokio::test]
    async fn test_pending_until_publish() {
        let notifier = ChangeNotifier::new(());
        let mut wait = task::spawn(notifier.await_change(0));
        assert_pending!(wait.poll());

        notifier.publish(());
        assert!(wait.is_woken());
        assert_eq!(assert_ready!(wait.poll()).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_versions_strictly_increase() {
        let notifier = ChangeNotifier::new(0);
        let versions: Vec<u64> = (1..=5).map(|i| notifier.publish(i)).collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);

        // Coalesced: a waiter behind by several versions sees only the latest
        let seen = notifier.await_change(2).await.unwrap();
        assert_eq!(seen.version, 5);
        assert_eq!(*seen.value, 5);
    }

    #[tokio::test]
    async fn test_close_rejects_waiters() {
        let notifier = Arc::new(ChangeNotifier::new(()));
        let n = notifier.clone();
        let pending = tokio::spawn(async move { n.await_change(0).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.close();

        assert_matches!(pending.await.unwrap(), Err(MatchingError::NotifierClosed));
        assert_matches!(notifier.await_change(0).await, Err(MatchingError::NotifierClosed));
        assert_eq!(notifier.publish(()), 0);
    }
}
