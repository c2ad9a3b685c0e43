//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. Every flag can also be given through the environment variable
//! named next to it. The parsed arguments act as a `figment` provider and are
//! layered over the built-in defaults by `Config::load`.
//!
//! The same struct also reads the flat layout of a YAML configuration file,
//! whose keys are the long flag names (`panel-base-url: ...`).

use crate::panel::PanelFlavor;
use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use serde::{de, Deserialize, Deserializer};
use std::net::IpAddr;
use std::path::PathBuf;

/// Exports 3X-UI / X-UI panel statistics as Prometheus metrics.
#[derive(Parser, Debug, Default, Deserialize)]
#[command(name = "xui-exporter", author, version, about, long_about = None)]
#[serde(rename_all = "kebab-case", default)]
pub struct Cli {
    /// Path to a YAML configuration file. Its values override all other sources.
    #[arg(long, env = "CONFIG_FILE", value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// IP to listen on.
    #[arg(long, env = "METRICS_IP", value_name = "IP")]
    pub metrics_ip: Option<IpAddr>,

    /// Port to listen on.
    #[arg(long, env = "METRICS_PORT", value_name = "PORT")]
    #[serde(deserialize_with = "port_from_number_or_text")]
    pub metrics_port: Option<u16>,

    /// Protect the metrics endpoint with basic auth.
    #[arg(long, env = "METRICS_PROTECTED", num_args = 0..=1, default_missing_value = "true")]
    pub metrics_protected: Option<bool>,

    /// Username for the metrics endpoint when protected.
    #[arg(long, env = "METRICS_USERNAME")]
    pub metrics_username: Option<String>,

    /// Password for the metrics endpoint when protected.
    #[arg(long, env = "METRICS_PASSWORD")]
    pub metrics_password: Option<String>,

    /// Interval between metric updates, in seconds.
    #[arg(long, env = "UPDATE_INTERVAL", value_name = "SECONDS")]
    pub update_interval: Option<u64>,

    /// Publish only the top N clients per inbound by traffic (0 = all).
    #[arg(long, env = "CLIENTS_BYTES_ROWS", value_name = "N")]
    pub clients_bytes_rows: Option<usize>,

    /// Timeout for requests to the panel, in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT", value_name = "SECONDS")]
    pub request_timeout: Option<u64>,

    /// Panel base URL.
    #[arg(long, env = "PANEL_BASE_URL", value_name = "URL")]
    pub panel_base_url: Option<String>,

    /// Panel username.
    #[arg(long, env = "PANEL_USERNAME")]
    pub panel_username: Option<String>,

    /// Panel password.
    #[arg(long, env = "PANEL_PASSWORD")]
    pub panel_password: Option<String>,

    /// Panel flavor: `three-x-ui` or `x-ui`.
    #[arg(long, env = "PANEL_FLAVOR", value_name = "FLAVOR")]
    pub panel_flavor: Option<PanelFlavor>,

    /// Skip TLS certificate verification (INSECURE).
    #[arg(long, env = "INSECURE_SKIP_VERIFY", num_args = 0..=1, default_missing_value = "true")]
    pub insecure_skip_verify: Option<bool>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, env = "LOG_LEVEL", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();
        let mut metrics = Dict::new();
        let mut panel = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }
        if let Some(interval) = self.update_interval {
            dict.insert("update_interval_seconds".into(), Value::from(interval));
        }
        if let Some(rows) = self.clients_bytes_rows {
            dict.insert("clients_bytes_rows".into(), Value::from(rows as u64));
        }
        if let Some(timeout) = self.request_timeout {
            dict.insert("request_timeout_seconds".into(), Value::from(timeout));
        }

        if let Some(ip) = self.metrics_ip {
            metrics.insert("listen_ip".into(), Value::from(ip.to_string()));
        }
        if let Some(port) = self.metrics_port {
            metrics.insert("listen_port".into(), Value::from(port as u64));
        }
        if let Some(protected) = self.metrics_protected {
            metrics.insert("protected".into(), Value::from(protected));
        }
        if let Some(username) = &self.metrics_username {
            metrics.insert("username".into(), Value::from(username.clone()));
        }
        if let Some(password) = &self.metrics_password {
            metrics.insert("password".into(), Value::from(password.clone()));
        }

        if let Some(url) = &self.panel_base_url {
            panel.insert("base_url".into(), Value::from(url.clone()));
        }
        if let Some(username) = &self.panel_username {
            panel.insert("username".into(), Value::from(username.clone()));
        }
        if let Some(password) = &self.panel_password {
            panel.insert("password".into(), Value::from(password.clone()));
        }
        if let Some(flavor) = self.panel_flavor {
            panel.insert("flavor".into(), Value::from(flavor.to_string()));
        }
        if let Some(skip) = self.insecure_skip_verify {
            panel.insert("insecure_skip_verify".into(), Value::from(skip));
        }

        if !metrics.is_empty() {
            dict.insert("metrics".into(), Value::from(metrics));
        }
        if !panel.is_empty() {
            dict.insert("panel".into(), Value::from(panel));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

/// Older configuration files quote the port (`metrics-port: "9090"`).
fn port_from_number_or_text<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) => text.trim().parse().map(Some).map_err(de::Error::custom),
    }
}
