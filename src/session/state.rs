use std::sync::Arc;

use tokio::sync::RwLock;

use super::config::SessionSettings;
use super::error::SessionError;
use super::store::SessionStore;
use crate::kv::CoordinationStore;
use crate::oauth::OidcProvider;

/// Entry point of the login flow, shared by the login initiator, the
/// callback endpoint and the resolver.
///
/// Cloning is cheap; all clones see the same provider and store. The only
/// state shared across processes lives in the coordination store.
pub struct Authenticator<P, K> {
    provider: Arc<RwLock<Option<Arc<P>>>>,
    pub(super) store: SessionStore<K>,
    pub(super) settings: SessionSettings,
}

// Manual Clone: avoid derive adding `P: Clone, K: Clone` bounds.
impl<P, K> Clone for Authenticator<P, K> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            store: self.store.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<P: OidcProvider, K: CoordinationStore> Authenticator<P, K> {
    /// Create an authenticator with no identity provider configured yet.
    pub fn new(kv: K, settings: SessionSettings) -> Self {
        Self {
            provider: Arc::new(RwLock::new(None)),
            store: SessionStore::new(kv),
            settings,
        }
    }

    /// Set the identity provider at construction time.
    #[must_use]
    pub fn with_provider(self, provider: P) -> Self {
        Self {
            provider: Arc::new(RwLock::new(Some(Arc::new(provider)))),
            ..self
        }
    }

    /// Replace the identity provider. Logins already in flight keep the
    /// provider they started with.
    pub async fn configure(&self, provider: P) {
        let name = provider.name().to_string();
        *self.provider.write().await = Some(Arc::new(provider));
        tracing::info!(provider = %name, "OIDC ID provider configured");
    }

    /// Remove the identity provider; operations then fail with
    /// [`SessionError::NotConfigured`].
    pub async fn clear_provider(&self) {
        *self.provider.write().await = None;
        tracing::info!("OIDC ID provider removed");
    }

    pub(super) async fn provider(&self) -> Result<Arc<P>, SessionError> {
        self.provider
            .read()
            .await
            .clone()
            .ok_or(SessionError::NotConfigured)
    }

    pub fn store(&self) -> &SessionStore<K> {
        &self.store
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}
