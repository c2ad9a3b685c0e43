//! Panel API access.
//!
//! Everything that talks to the web panel lives here: the dialect table
//! (`flavor`), the decode targets (`models`), the cached login session
//! (`session`) and the client that turns panel payloads into gauge updates
//! (`client`).

use reqwest::StatusCode;
use thiserror::Error;

pub mod client;
pub mod flavor;
pub mod models;
pub mod ranking;
pub mod session;

pub use client::PanelClient;
pub use flavor::PanelFlavor;
pub use session::{Authenticator, SessionCache, SessionCookie, SessionToken};

/// Failure of the login exchange. Fatal to the current collection tick only.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("login returned HTTP {0}")]
    Status(StatusCode),
    #[error("login rejected by panel: {0}")]
    Rejected(String),
    #[error("login response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("login response carried no `{0}` session cookie")]
    MissingCookie(String),
}

/// Failure of one of the data calls. The affected gauges keep their previous values.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("panel returned HTTP {0}")]
    Status(StatusCode),
    #[error("panel reported failure: {0}")]
    Rejected(String),
    #[error("unexpected response shape: {0}")]
    Decode(#[source] serde_json::Error),
}
