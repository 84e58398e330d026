use std::sync::Arc;
use std::time::Duration;

use super::error::SessionError;
use super::types::SessionInfo;
use crate::kv::{CoordinationStore, TxnError, Watcher};
use crate::types::{Nonce, SessionToken};

/// Key prefix for session records in the coordination store.
pub const SESSION_PREFIX: &str = "oidc-authns/";

/// Failure of [`SessionStore::transactional_update`].
#[derive(Debug, thiserror::Error)]
pub enum UpdateError<E> {
    /// The store failed or the record is gone; nothing was written.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The mutator refused the record; nothing was written.
    #[error("session update rejected by mutator")]
    Rejected(E),
}

enum Abort<E> {
    Corrupt(String),
    Mutator(E),
}

/// Typed view of session records over a [`CoordinationStore`].
pub struct SessionStore<K> {
    kv: Arc<K>,
}

impl<K> Clone for SessionStore<K> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
        }
    }
}

impl<K: CoordinationStore> SessionStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv: Arc::new(kv) }
    }

    /// Underlying coordination store.
    pub fn kv(&self) -> &K {
        &self.kv
    }

    fn key(token: &SessionToken) -> String {
        format!("{SESSION_PREFIX}{token}")
    }

    /// Inserts a pending record that the store drops after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StoreUnavailable`] if the record cannot be
    /// committed, including the (astronomically unlikely) case of a token
    /// collision.
    pub async fn create_pending(
        &self,
        token: &SessionToken,
        nonce: &Nonce,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let value = SessionInfo::pending(nonce.clone())
            .encode()
            .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;
        self.kv
            .create(&Self::key(token), value, Some(ttl))
            .await
            .map_err(|e| match SessionError::from(e) {
                // absent-key mapping does not apply to an insert
                SessionError::SessionExpired => {
                    SessionError::StoreUnavailable("create failed".into())
                }
                other => other,
            })
    }

    /// Current record, or `None` once it expired or was removed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StoreUnavailable`] on store or decode failure.
    pub async fn get(&self, token: &SessionToken) -> Result<Option<SessionInfo>, SessionError> {
        let Some(bytes) = self.kv.get(&Self::key(token)).await? else {
            return Ok(None);
        };
        SessionInfo::decode(&bytes)
            .map(Some)
            .map_err(|e| SessionError::StoreUnavailable(format!("corrupt session record: {e}")))
    }

    /// Opens a watch on the record. Dropping or closing the watcher releases it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StoreUnavailable`] if the watch cannot be opened.
    pub async fn watch(&self, token: &SessionToken) -> Result<Watcher, SessionError> {
        self.kv
            .watch(&Self::key(token))
            .await
            .map_err(|e| SessionError::StoreUnavailable(e.to_string()))
    }

    /// Reads the record, lets `mutator` edit it, and commits the edit in one
    /// serializable transaction.
    ///
    /// Nothing is written if the mutator leaves the record unchanged or fails.
    /// The mutator may run more than once on conflict. Returns the committed
    /// record.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Session`] with [`SessionError::SessionExpired`] if the
    ///   record no longer exists, or [`SessionError::StoreUnavailable`] if the
    ///   transaction cannot commit (retryable by the caller).
    /// - [`UpdateError::Rejected`] with the mutator's own error.
    pub async fn transactional_update<F, E>(
        &self,
        token: &SessionToken,
        mut mutator: F,
    ) -> Result<SessionInfo, UpdateError<E>>
    where
        F: FnMut(&mut SessionInfo) -> Result<(), E> + Send,
        E: Send,
    {
        let committed = self
            .kv
            .update(&Self::key(token), |bytes: &[u8]| -> Result<Option<Vec<u8>>, Abort<E>> {
                let current =
                    SessionInfo::decode(bytes).map_err(|e| Abort::Corrupt(e.to_string()))?;
                let mut next = current.clone();
                mutator(&mut next).map_err(Abort::Mutator)?;
                if next == current {
                    return Ok(None);
                }
                next.encode()
                    .map(Some)
                    .map_err(|e| Abort::Corrupt(e.to_string()))
            })
            .await
            .map_err(|e| match e {
                TxnError::Store(e) => UpdateError::Session(e.into()),
                TxnError::Aborted(Abort::Mutator(e)) => UpdateError::Rejected(e),
                TxnError::Aborted(Abort::Corrupt(detail)) => UpdateError::Session(
                    SessionError::StoreUnavailable(format!("corrupt session record: {detail}")),
                ),
            })?;

        SessionInfo::decode(&committed).map_err(|e| {
            UpdateError::Session(SessionError::StoreUnavailable(format!(
                "corrupt session record: {e}"
            )))
        })
    }

    /// Removes the record. Returns whether it still existed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StoreUnavailable`] on store failure.
    pub async fn delete(&self, token: &SessionToken) -> Result<bool, SessionError> {
        Ok(self.kv.delete(&Self::key(token)).await?)
    }
}
