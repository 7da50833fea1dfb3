//! Per-session serialization (spec §5 Concurrency & Resource Model):
//! concurrent requests against the same session id are queued, not
//! interleaved. A bounded wait turns pile-ups into a `session_busy` error
//! instead of unbounded queueing.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::RuntimeError;

pub const DEFAULT_WAIT: Duration = Duration::from_secs(30);

fn key(namespace: &str, id: &str) -> String {
    format!("{namespace}:{id}")
}

/// A table of per-session mutexes. Entries are weakly cleaned up: a `sweep`
/// drops any lock nobody currently holds a clone of, so the table doesn't
/// grow without bound across the lifetime of the process.
pub struct SessionLocks {
    table: DashMap<String, Arc<Mutex<()>>>,
    wait: Duration,
}

impl SessionLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            table: DashMap::new(),
            wait,
        }
    }

    /// Acquire exclusive access to `(namespace, id)`, waiting up to the
    /// configured bound. Returns [`RuntimeError::SessionBusy`] on timeout.
    pub async fn acquire(
        &self,
        namespace: &str,
        id: &str,
    ) -> Result<OwnedMutexGuard<()>, RuntimeError> {
        let k = key(namespace, id);
        let mutex = self
            .table
            .entry(k.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        tokio::time::timeout(self.wait, mutex.lock_owned())
            .await
            .map_err(|_| RuntimeError::SessionBusy(k))
    }

    /// Drop table entries whose mutex is only referenced by the table
    /// itself — i.e. no request currently holds or awaits it.
    pub fn sweep(&self) {
        self.table.retain(|_, m| Arc::strong_count(m) > 1);
    }
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serializes_access_to_same_session() {
        let locks = Arc::new(SessionLocks::new(Duration::from_millis(200)));
        let first = locks.acquire("ns", "s1").await.unwrap();

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move { locks2.acquire("ns", "s1").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(first);

        let second = waiter.await.unwrap();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn times_out_as_session_busy() {
        let locks = SessionLocks::new(Duration::from_millis(20));
        let _held = locks.acquire("ns", "s1").await.unwrap();
        let err = locks.acquire("ns", "s1").await.unwrap_err();
        assert_eq!(err.type_tag(), "session_busy");
    }

    #[tokio::test]
    async fn sweep_drops_unheld_entries() {
        let locks = SessionLocks::new(Duration::from_secs(1));
        {
            let _guard = locks.acquire("ns", "s1").await.unwrap();
        }
        locks.sweep();
        assert!(locks.table.is_empty());
    }
}
