//! Watchable, transactional key-value coordination store.
//!
//! The session flow spans processes that share no memory. All they share is
//! a store offering:
//!
//! - insert-if-absent with a time-to-live,
//! - point reads and deletes,
//! - a single-key watch delivering put/delete/error events,
//! - a serializable read-modify-write transaction.
//!
//! [`MemKv`] implements it in process, for tests and single-node deployments.
//! A networked store (etcd, Consul, ...) plugs in by implementing
//! [`CoordinationStore`].

mod memory;

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

pub use memory::MemKv;

/// Coordination-store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvError {
    /// Transient failure reaching or committing to the store.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("key already exists: {0}")]
    AlreadyExists(String),
}

/// Failure of a read-modify-write transaction.
#[derive(Debug, thiserror::Error)]
pub enum TxnError<E> {
    #[error(transparent)]
    Store(#[from] KvError),
    /// The mutator rejected the current value; nothing was written.
    #[error("transaction aborted by mutator")]
    Aborted(E),
}

/// One change observed on a watched key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The key was created or updated to this value.
    Put(Vec<u8>),
    /// The key was deleted or its TTL elapsed.
    Delete,
    /// The watch itself failed; no further events follow.
    Error(String),
}

/// Live event stream over a single key.
///
/// The subscription is released when the watcher is closed or dropped, on
/// every exit path of the consumer.
#[derive(Debug)]
pub struct Watcher {
    key: String,
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl Watcher {
    /// Wraps the receiving half of a store subscription.
    #[must_use]
    pub fn new(key: impl Into<String>, rx: mpsc::UnboundedReceiver<WatchEvent>) -> Self {
        Self {
            key: key.into(),
            rx,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next event, or `None` once the store has closed the stream.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Releases the subscription.
    pub fn close(mut self) {
        self.rx.close();
    }
}

/// Capability consumed by the session layer.
///
/// Implementations must deliver, as the first event of every watch, the
/// key's state at subscription time: `Put(current)` if it exists, `Delete`
/// otherwise. Later events follow commit order.
pub trait CoordinationStore: Send + Sync + 'static {
    /// Inserts `value` under `key` unless the key exists. With a `ttl`, the
    /// store removes the key once it elapses.
    fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), KvError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, KvError>> + Send;

    /// Removes `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, KvError>> + Send;

    /// Opens a watch over a single key.
    fn watch(&self, key: &str) -> impl Future<Output = Result<Watcher, KvError>> + Send;

    /// Reads `key`, applies `mutator` and commits its result atomically.
    ///
    /// The mutator returns `Ok(Some(new))` to write, `Ok(None)` to leave the
    /// value untouched, or `Err` to abort. It may run more than once if the
    /// store retries on conflict, so it must be pure with respect to its input.
    /// A TTL attached to the key survives the update. Returns the committed
    /// value.
    fn update<F, E>(
        &self,
        key: &str,
        mutator: F,
    ) -> impl Future<Output = Result<Vec<u8>, TxnError<E>>> + Send
    where
        F: FnMut(&[u8]) -> Result<Option<Vec<u8>>, E> + Send,
        E: Send;
}
