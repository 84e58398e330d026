#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use oidc_handoff::kv::{CoordinationStore, KvError, MemKv, TxnError, Watcher};
use oidc_handoff::oauth::{CodeExchange, OidcProvider, UserInfo};
use oidc_handoff::Error;
use oidc_handoff::session::{Authenticator, BackoffPolicy, LoginRequest, SessionSettings};
use oidc_handoff::types::{AccessToken, Nonce, SessionToken};
use url::Url;

pub const FAIL_CODE: &str = "fail";
pub const EMAIL: &str = "alice@example.com";

/// Identity provider double.
///
/// The authorization code doubles as the nonce the provider puts in its ID
/// token, so a test completes a login by passing back the nonce from the
/// authorization URL and forges a mismatch by passing anything else.
#[derive(Clone, Default)]
pub struct FakeProvider {
    exchanges: Arc<AtomicUsize>,
    user_info_calls: Arc<AtomicUsize>,
    fail_user_info: Arc<AtomicBool>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn user_info_calls(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    pub fn fail_user_info(&self) {
        self.fail_user_info.store(true, Ordering::SeqCst);
    }
}

impl OidcProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn authorization_url(&self, state: &SessionToken, nonce: &Nonce) -> Result<String, Error> {
        let mut url =
            Url::parse("https://idp.test/authorize").map_err(|e| Error::Config(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("state", state.as_str())
            .append_pair("nonce", nonce.as_str());
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<CodeExchange, Error> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if code == FAIL_CODE {
            return Err(Error::Token("invalid signature".into()));
        }
        Ok(CodeExchange::new(
            Nonce::from(code.to_string()),
            AccessToken::new(format!("at-{code}")),
        ))
    }

    async fn user_info(&self, access_token: &AccessToken) -> Result<UserInfo, Error> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_user_info.load(Ordering::SeqCst) {
            return Err(Error::OAuth {
                operation: "userinfo",
                status: Some(503),
                detail: "unavailable".into(),
            });
        }
        assert!(access_token.secret().starts_with("at-"));
        Ok(UserInfo::new("user-1").with_email(EMAIL).with_email_verified(true))
    }
}

/// [`MemKv`] whose transactions can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyKv {
    pub inner: MemKv,
    fail_updates: Arc<AtomicBool>,
}

impl FlakyKv {
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl CoordinationStore for FlakyKv {
    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        self.inner.create(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.inner.delete(key).await
    }

    async fn watch(&self, key: &str) -> Result<Watcher, KvError> {
        self.inner.watch(key).await
    }

    async fn update<F, E>(&self, key: &str, mutator: F) -> Result<Vec<u8>, TxnError<E>>
    where
        F: FnMut(&[u8]) -> Result<Option<Vec<u8>>, E> + Send,
        E: Send,
    {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("leader election in progress".into()).into());
        }
        self.inner.update(key, mutator).await
    }
}

pub fn fast_settings() -> SessionSettings {
    SessionSettings::default().with_backoff(
        BackoffPolicy::default()
            .with_initial_interval(Duration::from_millis(5))
            .with_max_interval(Duration::from_millis(20))
            .with_max_elapsed(Duration::from_secs(2))
            .with_randomization_factor(0.0),
    )
}

pub fn authenticator(kv: MemKv) -> (Authenticator<FakeProvider, MemKv>, FakeProvider) {
    let provider = FakeProvider::new();
    let auth = Authenticator::new(kv, fast_settings()).with_provider(provider.clone());
    (auth, provider)
}

/// The nonce embedded in a login's authorization URL.
pub fn nonce_of(login: &LoginRequest) -> String {
    let url = Url::parse(&login.url).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "nonce")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

/// Waits until `count` watches are open on `state`'s record.
pub async fn wait_for_watchers(kv: &MemKv, state: &SessionToken, count: usize) {
    let key = format!("{}{state}", oidc_handoff::session::SESSION_PREFIX);
    for _ in 0..200 {
        if kv.watcher_count(&key).await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} watchers on {key}");
}
