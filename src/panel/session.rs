//! Cached panel login session.
//!
//! The panel hands out a session cookie on login. The exporter keeps at most
//! one of them, treats it as valid for a fixed lifetime from the moment it
//! was issued, and logs in again only once that lifetime has run out.

use crate::panel::AuthError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Validity assumed for a freshly issued session, regardless of the cookie's own expiry.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(59 * 60);

/// Performs the login exchange.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self) -> Result<SessionCookie, AuthError>;
}

/// The session cookie returned by a successful login.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Value for a `Cookie` request header.
    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// A session cookie together with the instant it stops being used.
#[derive(Debug, Clone)]
pub struct SessionToken {
    cookie: SessionCookie,
    expires_at: Instant,
}

impl SessionToken {
    pub fn new(cookie: SessionCookie, expires_at: Instant) -> Self {
        Self { cookie, expires_at }
    }

    pub fn cookie(&self) -> &SessionCookie {
        &self.cookie
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Valid strictly before its expiry.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Holds the single live session and serializes refreshes.
///
/// The lock is held across the login exchange, so callers arriving while a
/// login is in flight wait for it and then reuse its result.
pub struct SessionCache {
    lifetime: Duration,
    current: Mutex<Option<SessionToken>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::with_lifetime(SESSION_LIFETIME)
    }

    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            lifetime,
            current: Mutex::new(None),
        }
    }

    /// Returns the cached token while it is valid, otherwise logs in and
    /// replaces it. A failed login leaves the cache as it was.
    pub async fn get_token(&self, authenticator: &dyn Authenticator) -> Result<SessionToken, AuthError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            let now = Instant::now();
            if token.is_valid_at(now) {
                let remaining = token.expires_at.duration_since(now);
                debug!(
                    remaining_minutes = %format!("{:.2}", remaining.as_secs_f64() / 60.0),
                    "Reusing cached panel session"
                );
                return Ok(token.clone());
            }
        }

        info!("Logging in to panel");
        let cookie = authenticator.login().await?;
        metrics::counter!("xui_exporter_logins_total").increment(1);

        let token = SessionToken::new(cookie, Instant::now() + self.lifetime);
        *current = Some(token.clone());
        Ok(token)
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}
