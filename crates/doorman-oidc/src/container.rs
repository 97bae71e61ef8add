//! Host container boundary
//!
//! The engine never owns an HTTP server. The host — an application
//! container, a reverse proxy, a framework middleware — implements
//! [`HttpExchange`] for its request/response pair and [`Session`] for its
//! session object, and calls the mechanism once per inbound request. The
//! mechanism reports what the host should do through [`AuthResult`] and
//! through the side-effecting primitives on the exchange (redirect,
//! identity establishment).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::context::OpenIdContext;

/// Outcome of running the mechanism against one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// The caller is authenticated; identity has been (re-)established.
    Authenticated {
        /// Principal name
        name: String,
        /// Resolved group set
        groups: Vec<String>,
    },
    /// A redirect has been issued; authentication continues on a later
    /// request.
    InProgress,
    /// The resource is not protected and no authentication was attempted.
    NotAttempted,
    /// A callback arrived but no expected state exists (e.g. the session
    /// holding it expired).
    NotValidated,
    /// The callback or token response failed verification.
    Invalid,
    /// Authentication was torn down (logout on expiry, failed refresh).
    Failure,
}

/// A cookie to be written on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    /// Path scope, normally the application context root
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    /// None means session cookie
    pub max_age: Option<Duration>,
}

/// One HTTP request/response pair as seen by the engine.
///
/// All methods are synchronous: they read or record in-memory request
/// state. Network work stays inside the engine.
pub trait HttpExchange: Send + Sync {
    /// Request method (`GET`, `POST`, ...)
    fn method(&self) -> String;

    /// Full request URL including the query string
    fn request_url(&self) -> String;

    /// First value of a query (or form) parameter
    fn parameter(&self, name: &str) -> Option<String>;

    /// First value of a request header
    fn header(&self, name: &str) -> Option<String>;

    /// Value of a request cookie
    fn cookie(&self, name: &str) -> Option<String>;

    /// Queue a cookie on the response
    fn set_cookie(&self, cookie: CookieSpec);

    /// Scheme + authority + context root of the application, no trailing
    /// slash; this is what `${baseURL}` resolves to
    fn base_url(&self) -> String;

    /// Application context root used as the cookie path (e.g. `/shop`)
    fn context_path(&self) -> String;

    /// Whether the requested resource demands an authenticated caller
    fn is_protected(&self) -> bool;

    /// Send a 3xx redirect to the given URL
    fn redirect(&self, url: &str);

    /// Register the caller identity with the container for this request
    fn establish_identity(&self, name: &str, groups: &[String]);

    /// Ask the container to persist the session across requests
    fn mark_session_persistent(&self);

    /// Session accessor; `create` forces creation when none exists yet
    fn session(&self, create: bool) -> Option<Arc<dyn Session>>;
}

/// The host's session object.
pub trait Session: Send + Sync {
    /// Stable session identifier
    fn id(&self) -> String;

    /// Read a string attribute
    fn attribute(&self, key: &str) -> Option<String>;

    /// Write a string attribute
    fn set_attribute(&self, key: &str, value: String);

    /// Remove a string attribute
    fn remove_attribute(&self, key: &str);

    /// The session-scoped authentication context, if established
    fn openid_context(&self) -> Option<Arc<OpenIdContext>>;

    /// Install the authentication context
    fn set_openid_context(&self, context: Arc<OpenIdContext>);

    /// Drop the authentication context
    fn remove_openid_context(&self);

    /// Mutex serializing token refresh for this session. The lock object
    /// is owned by the session itself so every request handling thread
    /// contends on the same instance.
    fn refresh_lock(&self) -> Arc<Mutex<()>>;

    /// Invalidate the session and everything stored in it
    fn invalidate(&self);
}
