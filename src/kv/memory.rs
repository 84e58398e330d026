use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use super::{CoordinationStore, KvError, TxnError, WatchEvent, Watcher};

struct Entry {
    value: Vec<u8>,
    // Identifies the TTL timer that owns this entry, so a timer armed for a
    // deleted-then-recreated key does not remove the new one.
    lease: Option<u64>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<WatchEvent>>>,
    next_lease: u64,
}

impl Inner {
    fn notify(&mut self, key: &str, event: &WatchEvent) {
        if let Some(senders) = self.watchers.get_mut(key) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
            if senders.is_empty() {
                self.watchers.remove(key);
            }
        }
    }

    /// Drops senders whose watcher is gone, including on keys that never see
    /// another event.
    fn prune_closed(&mut self) {
        self.watchers.retain(|_, senders| {
            senders.retain(|tx| !tx.is_closed());
            !senders.is_empty()
        });
    }
}

/// In-process [`CoordinationStore`].
///
/// Every operation holds one lock, which makes transactions trivially
/// serializable. TTLs are enforced by a timer task per key.
pub struct MemKv {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemKv {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemKv {
    fn clone(&self) -> Self {
        MemKv {
            inner: self.inner.clone(),
        }
    }
}

impl MemKv {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()).into(),
        }
    }

    /// Fails every open watch on `key` with `reason`, as a dropped connection
    /// to a remote store would.
    pub async fn fail_watchers(&self, key: &str, reason: &str) {
        let mut lock = self.inner.lock().await;
        if let Some(senders) = lock.watchers.remove(key) {
            for tx in senders {
                let _ = tx.send(WatchEvent::Error(reason.to_string()));
            }
        }
    }

    /// Number of live watch subscriptions on `key`.
    pub async fn watcher_count(&self, key: &str) -> usize {
        let mut lock = self.inner.lock().await;
        lock.prune_closed();
        lock.watchers.get(key).map_or(0, Vec::len)
    }

    fn arm_ttl(&self, key: String, lease: u64, ttl: Duration) {
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut lock = inner.lock().await;
            let owned = lock
                .entries
                .get(&key)
                .is_some_and(|entry| entry.lease == Some(lease));
            if owned {
                lock.entries.remove(&key);
                lock.notify(&key, &WatchEvent::Delete);
                tracing::debug!(key = %key, "key expired");
            }
        });
    }
}

impl CoordinationStore for MemKv {
    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        let mut lock = self.inner.lock().await;
        if lock.entries.contains_key(key) {
            return Err(KvError::AlreadyExists(key.to_string()));
        }

        let lease = ttl.map(|_| {
            lock.next_lease += 1;
            lock.next_lease
        });
        lock.entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                lease,
            },
        );
        lock.notify(key, &WatchEvent::Put(value));
        drop(lock);

        if let (Some(lease), Some(ttl)) = (lease, ttl) {
            self.arm_ttl(key.to_string(), lease, ttl);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let lock = self.inner.lock().await;
        Ok(lock.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut lock = self.inner.lock().await;
        let existed = lock.entries.remove(key).is_some();
        if existed {
            lock.notify(key, &WatchEvent::Delete);
        }
        Ok(existed)
    }

    async fn watch(&self, key: &str) -> Result<Watcher, KvError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut lock = self.inner.lock().await;

        let snapshot = match lock.entries.get(key) {
            Some(entry) => WatchEvent::Put(entry.value.clone()),
            None => WatchEvent::Delete,
        };
        // Receiver is alive, send cannot fail
        let _ = tx.send(snapshot);
        lock.prune_closed();
        lock.watchers.entry(key.to_string()).or_default().push(tx);

        Ok(Watcher::new(key, rx))
    }

    async fn update<F, E>(&self, key: &str, mut mutator: F) -> Result<Vec<u8>, TxnError<E>>
    where
        F: FnMut(&[u8]) -> Result<Option<Vec<u8>>, E> + Send,
        E: Send,
    {
        let mut lock = self.inner.lock().await;
        let current = lock
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| KvError::NotFound(key.to_string()))?;

        let Some(next) = mutator(&current).map_err(TxnError::Aborted)? else {
            return Ok(current);
        };

        if let Some(entry) = lock.entries.get_mut(key) {
            entry.value = next.clone();
        }
        lock.notify(key, &WatchEvent::Put(next.clone()));
        Ok(next)
    }
}
