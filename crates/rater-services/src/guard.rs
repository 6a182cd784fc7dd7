//! Keyed mutual exclusion
//!
//! One async mutex per storage key. Account and action plan mutations hold
//! the entry for their key; work on distinct keys never waits on each other.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Registry of per-key locks
///
/// Entries are created on first use and kept for the life of the registry.
#[derive(Debug, Default)]
pub struct KeyedGuard {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held locks, released on drop
#[derive(Debug)]
pub struct GuardTicket {
    keys: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl GuardTicket {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl KeyedGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn lock(&self, key: &str) -> GuardTicket {
        self.lock_many(&[key]).await
    }

    /// Locks several keys in sorted order so overlapping callers cannot
    /// deadlock. Duplicates are locked once.
    pub async fn lock_many<K: AsRef<str>>(&self, keys: &[K]) -> GuardTicket {
        let mut keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.entry(key).lock_owned().await);
        }
        debug!("Guard acquired: {:?}", keys);
        GuardTicket {
            keys,
            _guards: guards,
        }
    }

    /// Runs `f` while holding the locks of `keys`
    pub async fn guard<K, F, Fut, T>(&self, keys: &[K], f: F) -> T
    where
        K: AsRef<str>,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _ticket = self.lock_many(keys).await;
        f().await
    }

    /// Number of keys seen so far
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_many_sorts_and_dedupes() {
        let guard = KeyedGuard::new();
        let ticket = guard.lock_many(&["ubl_b", "apl_x", "ubl_a", "ubl_b"]).await;
        assert_eq!(ticket.keys(), &["apl_x", "ubl_a", "ubl_b"]);
        drop(ticket);
        assert_eq!(guard.len(), 3);
    }

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let guard = Arc::new(KeyedGuard::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = guard.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .guard(&["ubl_vdf:rif"], || async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let guard = KeyedGuard::new();
        let _held = guard.lock("ubl_vdf:rif").await;

        let other = tokio::time::timeout(Duration::from_millis(100), guard.lock("ubl_vdf:minu")).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), guard.lock("ubl_vdf:rif")).await;
        assert!(same.is_err());
    }

    #[test]
    fn test_entries_outlive_tickets() {
        let guard = KeyedGuard::new();
        assert!(guard.is_empty());
        tokio_test::block_on(async {
            let _ticket = guard.lock("apl_STANDARD").await;
        });
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test]
    async fn test_guard_returns_value() {
        let guard = KeyedGuard::new();
        let value = guard.guard(&["k"], || async { 42 }).await;
        assert_eq!(value, 42);
    }
}
