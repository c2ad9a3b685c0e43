//! HTTP client for the panel API.
//!
//! `PanelClient` performs the login exchange and the three data calls. Each
//! data call decodes its payload and projects it into the gauges held by
//! `PanelMetrics`; a call that fails leaves its gauges untouched.

use crate::panel::flavor::{Endpoint, LoginEncoding, PanelFlavor};
use crate::panel::models::{Envelope, Inbound, LoginResponse, OnlineUsers, ServerStatus};
use crate::panel::ranking::top_clients;
use crate::panel::session::{Authenticator, SessionCookie, SessionToken};
use crate::panel::{AuthError, FetchError};
use crate::sink::{
    PanelMetrics, CLIENT_DOWN, CLIENT_UP, INBOUND_DOWN, INBOUND_UP, ONLINE_USERS_COUNT,
    PANEL_MEMORY, PANEL_THREADS, PANEL_UPTIME, XRAY_VERSION,
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Connection settings for one panel.
#[derive(Debug, Clone)]
pub struct PanelClientConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub flavor: PanelFlavor,
    /// Overrides the flavor's session cookie name.
    pub session_cookie: Option<String>,
    pub insecure_skip_verify: bool,
    pub request_timeout: Duration,
    /// Per-inbound limit on published clients; 0 publishes all of them.
    pub clients_bytes_rows: usize,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

pub struct PanelClient {
    config: PanelClientConfig,
    http: reqwest::Client,
    metrics: PanelMetrics,
}

impl PanelClient {
    pub fn new(config: PanelClientConfig, metrics: PanelMetrics) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            config,
            http,
            metrics,
        })
    }

    pub fn config(&self) -> &PanelClientConfig {
        &self.config
    }

    fn session_cookie_name(&self) -> &str {
        self.config
            .session_cookie
            .as_deref()
            .unwrap_or_else(|| self.config.flavor.session_cookie())
    }

    /// Publishes the number of online users.
    #[instrument(skip_all, name = "fetch_online_users")]
    pub async fn fetch_online_users(&self, token: &SessionToken) -> Result<(), FetchError> {
        let onlines: OnlineUsers = self.get_obj(self.config.flavor.onlines(), token).await?;
        let count = onlines.map_or(0, |users| users.len());
        debug!(count, "Fetched online users");
        self.metrics.set_gauge(ONLINE_USERS_COUNT, &[], count as f64);
        Ok(())
    }

    /// Publishes the Xray version and the panel process statistics.
    #[instrument(skip_all, name = "fetch_server_status")]
    pub async fn fetch_server_status(&self, token: &SessionToken) -> Result<(), FetchError> {
        let status: ServerStatus = self
            .get_obj(self.config.flavor.server_status(), token)
            .await?;
        let version = &status.xray.version;
        debug!(version = %version, threads = status.app_stats.threads, "Fetched server status");

        // The version is a label, so an old version must not survive an upgrade.
        self.metrics.reset(XRAY_VERSION);
        self.metrics
            .set_gauge(XRAY_VERSION, &[("version", version)], encode_version(version));

        let stats = &status.app_stats;
        self.metrics.set_gauge(PANEL_THREADS, &[], stats.threads as f64);
        self.metrics.set_gauge(PANEL_MEMORY, &[], stats.mem as f64);
        self.metrics.set_gauge(PANEL_UPTIME, &[], stats.uptime as f64);
        Ok(())
    }

    /// Publishes per-inbound and per-client traffic counters.
    #[instrument(skip_all, name = "fetch_inbounds", fields(top_n = self.config.clients_bytes_rows))]
    pub async fn fetch_inbounds(&self, token: &SessionToken) -> Result<(), FetchError> {
        let inbounds: Vec<Inbound> = self.get_obj(self.config.flavor.inbounds(), token).await?;
        debug!(inbounds = inbounds.len(), "Fetched inbounds");

        for name in [INBOUND_UP, INBOUND_DOWN, CLIENT_UP, CLIENT_DOWN] {
            self.metrics.reset(name);
        }

        let limit = self.config.clients_bytes_rows;
        for inbound in &inbounds {
            let id = inbound.id.to_string();
            let labels = [("id", id.as_str()), ("remark", inbound.remark.as_str())];
            self.metrics.set_gauge(INBOUND_UP, &labels, inbound.up as f64);
            self.metrics.set_gauge(INBOUND_DOWN, &labels, inbound.down as f64);

            for client in top_clients(&inbound.client_stats, limit, |c| c.up) {
                let id = client.id.to_string();
                self.metrics.set_gauge(
                    CLIENT_UP,
                    &[("id", id.as_str()), ("email", client.email.as_str())],
                    client.up as f64,
                );
            }
            for client in top_clients(&inbound.client_stats, limit, |c| c.down) {
                let id = client.id.to_string();
                self.metrics.set_gauge(
                    CLIENT_DOWN,
                    &[("id", id.as_str()), ("email", client.email.as_str())],
                    client.down as f64,
                );
            }
        }
        Ok(())
    }

    /// Issues one data call and unwraps the `obj` of its envelope.
    async fn get_obj<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        token: &SessionToken,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.config.base_url, endpoint.path);
        let response = self
            .http
            .request(endpoint.method, &url)
            .header(ACCEPT, "application/json")
            .header(COOKIE, token.cookie().header_value())
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await.map_err(FetchError::Transport)?;
        let envelope: Envelope = serde_json::from_slice(&body).map_err(FetchError::Decode)?;
        if !envelope.success {
            return Err(FetchError::Rejected(envelope.msg));
        }
        serde_json::from_value(envelope.obj).map_err(FetchError::Decode)
    }
}

#[async_trait]
impl Authenticator for PanelClient {
    /// Posts the credentials and extracts the session cookie from the response.
    #[instrument(skip_all, fields(flavor = %self.config.flavor))]
    async fn login(&self) -> Result<SessionCookie, AuthError> {
        let url = format!("{}{}", self.config.base_url, PanelFlavor::LOGIN_PATH);
        let credentials = Credentials {
            username: &self.config.username,
            password: &self.config.password,
        };
        let request = self.http.post(&url);
        let request = match self.config.flavor.login_encoding() {
            LoginEncoding::Form => request.form(&credentials),
            LoginEncoding::Json => request.json(&credentials),
        };
        let response = request.send().await.map_err(AuthError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status(status));
        }

        let cookie_name = self.session_cookie_name();
        let cookie = response
            .cookies()
            .find(|cookie| cookie.name() == cookie_name)
            .map(|cookie| SessionCookie::new(cookie.name(), cookie.value()));

        let body: LoginResponse = response.json().await.map_err(AuthError::Decode)?;
        if !body.success {
            return Err(AuthError::Rejected(body.msg));
        }

        cookie.ok_or_else(|| AuthError::MissingCookie(cookie_name.to_string()))
    }
}

/// Numeric form of a dotted version: separators are dropped and the rest is
/// parsed as a number, so `1.8.4` becomes `184`. Unparseable versions give 0.
pub fn encode_version(version: &str) -> f64 {
    version
        .replace('.', "")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_version() {
        assert_eq!(encode_version("1.8.4"), 184.0);
        assert_eq!(encode_version("25.3.31"), 25331.0);
        assert_eq!(encode_version("abc"), 0.0);
        assert_eq!(encode_version(""), 0.0);
        assert_eq!(encode_version("v1.8.4"), 0.0);
        assert_eq!(encode_version("inf"), 0.0);
    }
}
