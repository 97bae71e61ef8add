//! Common test utilities for integration tests
//!
//! Provides a wiremock-backed mock OpenID Provider (discovery, token,
//! jwks and userinfo endpoints) plus in-memory implementations of the
//! host boundary (exchange + session) that record redirects and identity
//! registrations for assertions.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doorman_oidc::container::{CookieSpec, HttpExchange, Session};
use doorman_oidc::context::OpenIdContext;
use doorman_oidc::{MetadataFetcher, OpenIdConfig, OpenIdConfiguration};

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-signing-secret";

/// A definition pointing at the mock provider
pub fn base_config(provider_uri: &str) -> OpenIdConfig {
    serde_json::from_value(json!({
        "client_id": CLIENT_ID,
        "client_secret": CLIENT_SECRET,
        "provider_uri": provider_uri,
        "redirect_uri": "${baseURL}/callback",
    }))
    .expect("definition deserializes")
}

/// Resolve a (possibly tweaked) definition against the mock provider
pub async fn resolved_configuration(
    provider: &MockProvider,
    tweak: impl FnOnce(&mut OpenIdConfig),
) -> Arc<OpenIdConfiguration> {
    let mut config = base_config(&provider.issuer());
    tweak(&mut config);
    let fetcher = MetadataFetcher::new(config.connect_timeout(), config.read_timeout())
        .expect("fetcher builds");
    Arc::new(
        OpenIdConfiguration::resolve(config, &fetcher)
            .await
            .expect("configuration resolves"),
    )
}

/// Seconds since the epoch, as claims carry it
pub fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs() as i64
}

/// Sign an HS256 token with the shared test client secret
pub fn hs256_token(claims: &serde_json::Value) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(CLIENT_SECRET.as_bytes()),
    )
    .expect("token signs")
}

/// Mock OpenID Provider
pub struct MockProvider {
    pub server: MockServer,
}

impl MockProvider {
    /// Start the mock provider and mount its discovery document
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/token"),
                "userinfo_endpoint": format!("{base}/userinfo"),
                "end_session_endpoint": format!("{base}/logout"),
                "jwks_uri": format!("{base}/jwks"),
                "response_types_supported": ["code"],
                "id_token_signing_alg_values_supported": ["HS256", "RS256"],
            })))
            .mount(&server)
            .await;

        Self { server }
    }

    /// Provider base URI (doubles as the issuer)
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Well-formed ID token claims for this provider
    pub fn id_claims(&self, subject: &str, nonce_hash: Option<&str>) -> serde_json::Value {
        let now = epoch_now();
        let mut claims = json!({
            "iss": self.issuer(),
            "sub": subject,
            "aud": CLIENT_ID,
            "exp": now + 3600,
            "iat": now,
            "preferred_username": "jdoe",
            "groups": ["users", "admins"],
        });
        if let Some(nonce) = nonce_hash {
            claims["nonce"] = json!(nonce);
        }
        claims
    }

    /// Mount a successful response for the authorization-code exchange
    pub async fn mock_code_exchange(&self, id_token: &str, access_token: &str, refresh_token: Option<&str>) {
        let mut body = json!({
            "id_token": id_token,
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "openid email profile",
        });
        if let Some(refresh) = refresh_token {
            body["refresh_token"] = json!(refresh);
        }

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mount a successful response for the refresh exchange
    pub async fn mock_refresh_exchange(
        &self,
        id_token: Option<&str>,
        access_token: &str,
        expires_in: u64,
    ) {
        let mut body = json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": expires_in,
        });
        if let Some(id) = id_token {
            body["id_token"] = json!(id);
        }

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mount an OAuth error document on the token endpoint
    pub async fn mock_token_error(&self, error: &str, description: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": error,
                "error_description": description,
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a JSON userinfo response
    pub async fn mock_userinfo(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mount a userinfo response with a non-JSON content type
    pub async fn mock_userinfo_jwt(&self) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/jwt")
                    .set_body_string("a.b.c"),
            )
            .mount(&self.server)
            .await;
    }
}

/// In-memory session shared across the requests of one test flow
#[derive(Default)]
pub struct MockSession {
    attributes: Mutex<HashMap<String, String>>,
    context: Mutex<Option<Arc<OpenIdContext>>>,
    refresh_lock: Mutex<Option<Arc<tokio::sync::Mutex<()>>>>,
    invalidated: AtomicBool,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }
}

impl Session for MockSession {
    fn id(&self) -> String {
        "session-1".to_string()
    }

    fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.lock().unwrap().get(key).cloned()
    }

    fn set_attribute(&self, key: &str, value: String) {
        self.attributes.lock().unwrap().insert(key.to_string(), value);
    }

    fn remove_attribute(&self, key: &str) {
        self.attributes.lock().unwrap().remove(key);
    }

    fn openid_context(&self) -> Option<Arc<OpenIdContext>> {
        self.context.lock().unwrap().clone()
    }

    fn set_openid_context(&self, context: Arc<OpenIdContext>) {
        *self.context.lock().unwrap() = Some(context);
    }

    fn remove_openid_context(&self) {
        *self.context.lock().unwrap() = None;
    }

    fn refresh_lock(&self) -> Arc<tokio::sync::Mutex<()>> {
        let mut lock = self.refresh_lock.lock().unwrap();
        Arc::clone(lock.get_or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))))
    }

    fn invalidate(&self) {
        self.attributes.lock().unwrap().clear();
        *self.context.lock().unwrap() = None;
        self.invalidated.store(true, Ordering::SeqCst);
    }
}

/// One simulated request/response pair
pub struct MockExchange {
    url: String,
    parameters: HashMap<String, String>,
    headers: HashMap<String, String>,
    cookies: Mutex<HashMap<String, String>>,
    protected: bool,
    base_url: String,
    session: Mutex<Option<Arc<MockSession>>>,
    redirects: Mutex<Vec<String>>,
    identities: Mutex<Vec<(String, Vec<String>)>>,
    set_cookies: Mutex<Vec<CookieSpec>>,
    session_persistent: AtomicBool,
}

impl MockExchange {
    /// A request to `url` (query parameters given separately)
    pub fn new(url: &str) -> Self {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
        let mut parameters = HashMap::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            parameters.insert(key.to_string(), value.to_string());
        }
        Self {
            url: url.to_string(),
            parameters,
            headers: HashMap::new(),
            cookies: Mutex::new(HashMap::new()),
            protected: true,
            base_url: "https://app.example.com".to_string(),
            session: Mutex::new(None),
            redirects: Mutex::new(Vec::new()),
            identities: Mutex::new(Vec::new()),
            set_cookies: Mutex::new(Vec::new()),
            session_persistent: AtomicBool::new(false),
        }
    }

    pub fn unprotected(mut self) -> Self {
        self.protected = false;
        self
    }

    /// Continue the flow on an existing session
    pub fn with_session(self, session: Arc<MockSession>) -> Self {
        *self.session.lock().unwrap() = Some(session);
        self
    }

    /// The session created or carried by this exchange
    pub fn current_session(&self) -> Option<Arc<MockSession>> {
        self.session.lock().unwrap().clone()
    }

    pub fn last_redirect(&self) -> Option<String> {
        self.redirects.lock().unwrap().last().cloned()
    }

    pub fn established_identities(&self) -> Vec<(String, Vec<String>)> {
        self.identities.lock().unwrap().clone()
    }

    pub fn was_marked_persistent(&self) -> bool {
        self.session_persistent.load(Ordering::SeqCst)
    }
}

impl HttpExchange for MockExchange {
    fn method(&self) -> String {
        "GET".to_string()
    }

    fn request_url(&self) -> String {
        self.url.clone()
    }

    fn parameter(&self, name: &str) -> Option<String> {
        self.parameters.get(name).cloned()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).cloned()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }

    fn set_cookie(&self, cookie: CookieSpec) {
        self.set_cookies.lock().unwrap().push(cookie);
    }

    fn base_url(&self) -> String {
        self.base_url.clone()
    }

    fn context_path(&self) -> String {
        "/".to_string()
    }

    fn is_protected(&self) -> bool {
        self.protected
    }

    fn redirect(&self, url: &str) {
        self.redirects.lock().unwrap().push(url.to_string());
    }

    fn establish_identity(&self, name: &str, groups: &[String]) {
        self.identities
            .lock()
            .unwrap()
            .push((name.to_string(), groups.to_vec()));
    }

    fn mark_session_persistent(&self) {
        self.session_persistent.store(true, Ordering::SeqCst);
    }

    fn session(&self, create: bool) -> Option<Arc<dyn Session>> {
        let mut session = self.session.lock().unwrap();
        if session.is_none() && create {
            *session = Some(MockSession::new());
        }
        session.clone().map(|s| s as Arc<dyn Session>)
    }
}

/// Extract one query parameter from a recorded redirect URL
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
