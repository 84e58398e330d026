#![cfg(feature = "oauth")]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use oidc_handoff::oauth::{HttpOidcProvider, OidcConfig, OidcProvider};
use oidc_handoff::{AccessToken, Error};

const CLIENT_ID: &str = "test-client";
const CLIENT_SECRET: &str = "test-secret";
const SIGNING_KEY: &[u8] = include_bytes!("fixtures/idp_rsa.pem");

/// Minimal identity provider served on a loopback port.
///
/// Authorization codes have the form `<kid>.<nonce>`: the issued ID token is
/// signed under `kid` and carries `nonce`, and the access token is
/// `at-<nonce>`.
#[derive(Clone)]
struct Idp {
    base: String,
    advertised_issuer: String,
    published_kids: Arc<RwLock<Vec<String>>>,
    jwks_fetches: Arc<AtomicUsize>,
}

impl Idp {
    async fn spawn() -> Self {
        Self::spawn_advertising(None).await
    }

    async fn spawn_advertising(issuer: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let idp = Self {
            advertised_issuer: issuer.map_or_else(|| base.clone(), str::to_string),
            base,
            published_kids: Arc::new(RwLock::new(vec!["k1".into()])),
            jwks_fetches: Arc::new(AtomicUsize::new(0)),
        };

        let router = Router::new()
            .route("/.well-known/openid-configuration", get(discovery))
            .route("/token", post(token))
            .route("/jwks", get(jwks))
            .route("/userinfo", get(userinfo))
            .with_state(idp.clone());
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        idp
    }

    fn config(&self) -> OidcConfig {
        OidcConfig::new(
            self.base.parse().unwrap(),
            CLIENT_ID,
            CLIENT_SECRET,
            "http://localhost/authorization-code/callback".parse().unwrap(),
        )
        .with_name("loopback")
    }

    async fn provider(&self) -> HttpOidcProvider {
        HttpOidcProvider::discover(self.config()).await.unwrap()
    }

    async fn publish(&self, kid: &str) {
        self.published_kids.write().await.push(kid.into());
    }

    fn jwks_fetches(&self) -> usize {
        self.jwks_fetches.load(Ordering::SeqCst)
    }
}

async fn discovery(State(idp): State<Idp>) -> Json<Value> {
    let base = &idp.base;
    Json(json!({
        "issuer": idp.advertised_issuer,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "jwks_uri": format!("{base}/jwks"),
        "userinfo_endpoint": format!("{base}/userinfo"),
        "scopes_supported": ["openid", "profile", "email"],
        "id_token_signing_alg_values_supported": ["RS256"],
    }))
}

async fn token(
    State(idp): State<Idp>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let field = |name: &str| form.get(name).map(String::as_str).unwrap_or_default();
    if field("grant_type") != "authorization_code"
        || field("client_id") != CLIENT_ID
        || field("client_secret") != CLIENT_SECRET
    {
        return Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_client" }))));
    }

    let code = field("code");
    if code == "opaque" {
        return Ok(Json(json!({ "access_token": "at-opaque", "token_type": "Bearer" })));
    }
    let Some((kid, nonce)) = code.split_once('.') else {
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" }))));
    };

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let claims = json!({
        "sub": "user-1",
        "iss": idp.advertised_issuer,
        "aud": CLIENT_ID,
        "iat": now,
        "exp": now + 600,
        "nonce": nonce,
    });
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.into());
    let id_token = encode(&header, &claims, &EncodingKey::from_rsa_pem(SIGNING_KEY).unwrap())
        .unwrap();

    Ok(Json(json!({
        "access_token": format!("at-{nonce}"),
        "token_type": "Bearer",
        "id_token": id_token,
    })))
}

async fn jwks(State(idp): State<Idp>) -> Json<Value> {
    idp.jwks_fetches.fetch_add(1, Ordering::SeqCst);
    let template: Value = serde_json::from_str(include_str!("fixtures/idp_jwk.json")).unwrap();
    let keys: Vec<Value> = idp
        .published_kids
        .read()
        .await
        .iter()
        .map(|kid| {
            let mut jwk = template.clone();
            jwk["kid"] = json!(kid);
            jwk
        })
        .collect();
    Json(json!({ "keys": keys }))
}

async fn userinfo(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if !bearer.starts_with("at-") {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!({
        "sub": "user-1",
        "email": "alice@example.com",
        "email_verified": true,
    })))
}

#[tokio::test]
async fn discovery_exchange_and_user_info() {
    let idp = Idp::spawn().await;
    let provider = idp.provider().await;
    assert_eq!(provider.metadata().token_endpoint, format!("{}/token", idp.base));

    let exchange = provider.exchange_code("k1.n-1").await.unwrap();
    assert_eq!(exchange.nonce.as_str(), "n-1");
    assert_eq!(exchange.access_token.secret(), "at-n-1");

    let user = provider.user_info(&exchange.access_token).await.unwrap();
    assert_eq!(user.sub, "user-1");
    assert_eq!(user.email.as_deref(), Some("alice@example.com"));
    assert_eq!(user.email_verified, Some(true));
}

#[tokio::test]
async fn advertised_issuer_must_match() {
    let idp = Idp::spawn_advertising(Some("https://elsewhere.example.com")).await;
    let err = HttpOidcProvider::discover(idp.config()).await.err().unwrap();
    assert!(matches!(err, Error::Discovery(ref msg) if msg.contains("issuer mismatch")));
}

#[tokio::test]
async fn missing_discovery_document() {
    let idp = Idp::spawn().await;
    let config = OidcConfig::new(
        format!("{}/realms/none", idp.base).parse().unwrap(),
        CLIENT_ID,
        CLIENT_SECRET,
        "http://localhost/authorization-code/callback".parse().unwrap(),
    );
    let err = HttpOidcProvider::discover(config).await.err().unwrap();
    assert!(matches!(err, Error::Discovery(ref msg) if msg.contains("404")));
}

#[tokio::test]
async fn signing_keys_are_cached() {
    let idp = Idp::spawn().await;
    let provider = idp.provider().await;

    provider.exchange_code("k1.a").await.unwrap();
    provider.exchange_code("k1.b").await.unwrap();
    provider.exchange_code("k1.c").await.unwrap();
    assert_eq!(idp.jwks_fetches(), 1);
}

#[tokio::test]
async fn rotated_key_is_fetched_once() {
    let idp = Idp::spawn().await;
    let provider = idp.provider().await;
    provider.exchange_code("k1.a").await.unwrap();
    assert_eq!(idp.jwks_fetches(), 1);

    idp.publish("k2").await;
    let exchange = provider.exchange_code("k2.b").await.unwrap();
    assert_eq!(exchange.nonce.as_str(), "b");
    assert_eq!(idp.jwks_fetches(), 2);

    // both keys are now cached
    provider.exchange_code("k1.c").await.unwrap();
    provider.exchange_code("k2.d").await.unwrap();
    assert_eq!(idp.jwks_fetches(), 2);
}

#[tokio::test]
async fn unpublished_key_is_rejected_after_one_refetch() {
    let idp = Idp::spawn().await;
    let provider = idp.provider().await;
    provider.exchange_code("k1.a").await.unwrap();

    let err = provider.exchange_code("k9.b").await.unwrap_err();
    assert!(matches!(err, Error::Token(ref msg) if msg.contains("k9")));
    assert_eq!(idp.jwks_fetches(), 2);

    // the good key survives the refetch
    provider.exchange_code("k1.c").await.unwrap();
    assert_eq!(idp.jwks_fetches(), 2);
}

#[tokio::test]
async fn rejected_code_is_an_oauth_error() {
    let idp = Idp::spawn().await;
    let provider = idp.provider().await;

    let err = provider.exchange_code("no-such-code").await.unwrap_err();
    assert!(matches!(
        err,
        Error::OAuth { operation: "token exchange", status: Some(400), .. }
    ));
}

#[tokio::test]
async fn token_response_without_id_token() {
    let idp = Idp::spawn().await;
    let provider = idp.provider().await;

    let err = provider.exchange_code("opaque").await.unwrap_err();
    assert!(matches!(err, Error::Token(ref msg) if msg == "missing id token"));
    assert_eq!(idp.jwks_fetches(), 0);
}

#[tokio::test]
async fn user_info_rejects_bad_credential() {
    let idp = Idp::spawn().await;
    let provider = idp.provider().await;

    let err = provider
        .user_info(&AccessToken::new("stolen"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::OAuth { operation: "userinfo request", status: Some(401), .. }
    ));
}
