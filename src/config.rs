//! Configuration management for the exporter
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer built-in defaults, command-line arguments (which also carry
//! environment variables) and an optional YAML file, in that order.

use crate::cli::Cli;
use crate::panel::client::PanelClientConfig;
use crate::panel::PanelFlavor;
use crate::sink::server::BasicAuth;
use figment::{
    providers::{Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Errors that prevent the exporter from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("{0} must be provided")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level, used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Seconds between two collection ticks.
    pub update_interval_seconds: u64,
    /// Per-inbound limit on published clients; 0 publishes all of them.
    pub clients_bytes_rows: usize,
    /// Timeout for every request to the panel, in seconds.
    pub request_timeout_seconds: u64,
    /// Configuration for the `/metrics` endpoint.
    pub metrics: MetricsConfig,
    /// Configuration for the panel connection.
    pub panel: PanelConfig,
}

/// Configuration for the `/metrics` endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    pub listen_ip: IpAddr,
    pub listen_port: u16,
    /// Whether scraping requires basic auth.
    pub protected: bool,
    pub username: String,
    pub password: String,
}

/// Configuration for the panel connection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct PanelConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Accept invalid TLS certificates (INSECURE).
    pub insecure_skip_verify: bool,
    pub flavor: PanelFlavor,
    /// Overrides the flavor's session cookie name.
    pub session_cookie: Option<String>,
}

impl Config {
    /// Loads and validates the configuration.
    ///
    /// A YAML file named by `--config-file` overrides every setting it
    /// contains, including ones given on the command line. The file may use
    /// the nested layout of `Config` or flat keys named after the long
    /// command-line flags; when both name a setting, the nested key wins.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(cli);

        if let Some(path) = &cli.config_file {
            if !path.is_file() {
                return Err(ConfigError::Invalid(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
            let flat: Cli = Figment::from(Yaml::file(path)).extract()?;
            figment = figment.merge(flat).merge(Yaml::file(path));
        }

        let mut config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks required settings and normalizes the base URL.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let base_url = self.panel.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ConfigError::Missing("--panel-base-url"));
        }
        reqwest::Url::parse(base_url).map_err(|e| {
            ConfigError::Invalid(format!("panel base URL `{}` is not a valid URL: {}", base_url, e))
        })?;
        self.panel.base_url = base_url.to_string();

        if self.panel.username.is_empty() {
            return Err(ConfigError::Missing("--panel-username"));
        }
        if self.panel.password.is_empty() {
            return Err(ConfigError::Missing("--panel-password"));
        }
        if self.update_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "update interval must be at least one second".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "request timeout must be at least one second".to_string(),
            ));
        }
        if self.metrics.protected && (self.metrics.username.is_empty() || self.metrics.password.is_empty()) {
            return Err(ConfigError::Invalid(
                "protected metrics require a username and a password".to_string(),
            ));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds)
    }

    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::new(self.metrics.listen_ip, self.metrics.listen_port)
    }

    /// Credentials for the `/metrics` endpoint, if it is protected.
    pub fn basic_auth(&self) -> Option<BasicAuth> {
        self.metrics.protected.then(|| BasicAuth {
            username: self.metrics.username.clone(),
            password: self.metrics.password.clone(),
        })
    }

    pub fn panel_client_config(&self) -> PanelClientConfig {
        PanelClientConfig {
            base_url: self.panel.base_url.clone(),
            username: self.panel.username.clone(),
            password: self.panel.password.clone(),
            flavor: self.panel.flavor,
            session_cookie: self.panel.session_cookie.clone(),
            insecure_skip_verify: self.panel.insecure_skip_verify,
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            clients_bytes_rows: self.clients_bytes_rows,
        }
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            update_interval_seconds: 30,
            clients_bytes_rows: 0,
            request_timeout_seconds: 30,
            metrics: MetricsConfig {
                listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                listen_port: 9090,
                protected: false,
                username: "metricsUser".to_string(),
                password: "MetricsVeryHardPassword".to_string(),
            },
            panel: PanelConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.panel.base_url = "https://panel.example.com:2053/".to_string();
        config.panel.username = "admin".to_string();
        config.panel.password = "admin".to_string();
        config
    }

    #[test]
    fn test_validate_strips_trailing_slash() {
        let mut config = valid();
        config.validate().unwrap();
        assert_eq!(config.panel.base_url, "https://panel.example.com:2053");
    }

    #[test]
    fn test_validate_requires_panel_credentials() {
        let mut config = valid();
        config.panel.password.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("--panel-password"))));

        let mut config = valid();
        config.panel.base_url = "/".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("--panel-base-url"))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = valid();
        config.update_interval_seconds = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_basic_auth_only_when_protected() {
        let mut config = valid();
        assert!(config.basic_auth().is_none());
        config.metrics.protected = true;
        assert_eq!(config.basic_auth().unwrap().username, "metricsUser");
    }
}
