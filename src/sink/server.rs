//! # Metrics Server
//!
//! This module defines the `MetricsServer`, which runs an `axum`-based web
//! server exposing the panel gauges to a Prometheus scraper.
//!
//! The server provides a single endpoint, `/metrics`, rendered from the
//! latest published values. When basic auth is configured, every request
//! must carry matching credentials.

use crate::sink::PanelMetrics;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::future::Future;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, trace};

/// Credentials required to scrape the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    fn accepts(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        else {
            return false;
        };
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((username, password)) = decoded.split_once(':') else {
            return false;
        };
        let matches = username.as_bytes().ct_eq(self.username.as_bytes())
            & password.as_bytes().ct_eq(self.password.as_bytes());
        matches.into()
    }
}

/// A server that exposes metrics to a Prometheus scraper.
pub struct MetricsServer {
    listener: TcpListener,
    metrics: PanelMetrics,
    auth: Option<BasicAuth>,
    shutdown_rx: watch::Receiver<bool>,
}

impl MetricsServer {
    /// Creates a new `MetricsServer` but does not spawn it.
    ///
    /// # Arguments
    ///
    /// * `listener` - A `TcpListener` that has already been bound to an address.
    /// * `metrics` - The sink whose current values are rendered on each scrape.
    /// * `auth` - Basic auth credentials, or `None` for an open endpoint.
    /// * `shutdown_rx` - A watch channel receiver for graceful shutdown.
    pub fn new(
        listener: TcpListener,
        metrics: PanelMetrics,
        auth: Option<BasicAuth>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            metrics,
            auth,
            shutdown_rx,
        }
    }

    /// Builds the router. Exposed separately so it can be exercised without a socket.
    pub fn router(metrics: PanelMetrics, auth: Option<BasicAuth>) -> Router {
        let router = Router::new()
            .route("/metrics", get(render_metrics))
            .with_state(metrics);
        match auth {
            Some(auth) => router.layer(middleware::from_fn_with_state(
                Arc::new(auth),
                require_basic_auth,
            )),
            None => router,
        }
    }

    /// Returns a future that runs the server until a shutdown signal is received.
    pub fn run(self) -> impl Future<Output = ()> {
        let app = Self::router(self.metrics, self.auth);
        let mut shutdown_rx = self.shutdown_rx;
        let listener = self.listener;

        async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
                trace!("Metrics server received shutdown signal.");
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Metrics server error: {}", e);
            }
            trace!("Metrics server task finished.");
        }
    }
}

async fn render_metrics(State(metrics): State<PanelMetrics>) -> Response {
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT))],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

async fn require_basic_auth(
    State(auth): State<Arc<BasicAuth>>,
    request: Request,
    next: Next,
) -> Response {
    if auth.accepts(request.headers()) {
        return next.run(request).await;
    }
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"metrics\""),
        )],
        "Unauthorized.",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> BasicAuth {
        BasicAuth {
            username: "metricsUser".to_string(),
            password: "secret".to_string(),
        }
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_accepts_matching_credentials() {
        let encoded = STANDARD.encode("metricsUser:secret");
        assert!(auth().accepts(&headers_with(&format!("Basic {encoded}"))));
    }

    #[test]
    fn test_rejects_wrong_or_malformed_credentials() {
        let wrong = STANDARD.encode("metricsUser:nope");
        assert!(!auth().accepts(&headers_with(&format!("Basic {wrong}"))));
        assert!(!auth().accepts(&headers_with("Basic !!!not-base64")));
        assert!(!auth().accepts(&headers_with("Bearer abc")));
        assert!(!auth().accepts(&HeaderMap::new()));
    }

    #[test]
    fn test_rejects_credentials_differing_only_in_length() {
        let prefix = STANDARD.encode("metricsUser:secre");
        let longer = STANDARD.encode("metricsUser:secret2");
        let short_user = STANDARD.encode("metricsUse:secret");
        assert!(!auth().accepts(&headers_with(&format!("Basic {prefix}"))));
        assert!(!auth().accepts(&headers_with(&format!("Basic {longer}"))));
        assert!(!auth().accepts(&headers_with(&format!("Basic {short_user}"))));
    }

    #[test]
    fn test_password_may_contain_colon() {
        let auth = BasicAuth {
            username: "u".to_string(),
            password: "p:w".to_string(),
        };
        let encoded = STANDARD.encode("u:p:w");
        assert!(auth.accepts(&headers_with(&format!("Basic {encoded}"))));
    }
}
