//! The main application logic, decoupled from the entry point.

use crate::{
    collector::Collector,
    config::Config,
    panel::{PanelClient, SessionCache},
    sink::{server::MetricsServer, PanelMetrics},
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    metrics_addr: SocketAddr,
    metrics: PanelMetrics,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the `/metrics` endpoint is bound to.
    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    pub fn metrics(&self) -> &PanelMetrics {
        &self.metrics
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        if !*shutdown_rx.borrow() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;
        Ok(())
    }
}

/// Builder for the main application.
///
/// Separates constructing the components from running them, and lets tests
/// swap in their own metric sink.
pub struct AppBuilder {
    config: Config,
    metrics_override: Option<PanelMetrics>,
    install_global_recorder: bool,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            metrics_override: None,
            install_global_recorder: false,
        }
    }

    /// Uses the given sink instead of a fresh one.
    pub fn metrics_override(mut self, metrics: PanelMetrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Installs the sink as the process-wide `metrics` recorder, so the
    /// exporter's own counters are exposed next to the panel gauges.
    pub fn install_global_recorder(mut self, install: bool) -> Self {
        self.install_global_recorder = install;
        self
    }

    /// Builds all components and spawns the collector and the metrics server.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);

        // =========================================================================
        // 1. Metric Sink
        // =========================================================================
        let metrics = match self.metrics_override {
            Some(metrics) => metrics,
            None => PanelMetrics::new().context("Failed to register panel metrics")?,
        };
        if self.install_global_recorder && metrics::set_global_recorder(metrics.clone()).is_err() {
            warn!("A global metrics recorder is already installed; exporter counters will not be exposed.");
        }

        // =========================================================================
        // 2. Panel Client and Session
        // =========================================================================
        let client = PanelClient::new(config.panel_client_config(), metrics.clone())
            .context("Failed to build the panel HTTP client")?;
        let client = Arc::new(client);
        let session = Arc::new(SessionCache::new());

        // =========================================================================
        // 3. Metrics Server
        // =========================================================================
        let listen_address = config.listen_address();
        let listener = TcpListener::bind(listen_address)
            .await
            .with_context(|| format!("Failed to bind metrics server to {}", listen_address))?;
        let metrics_addr = listener.local_addr()?;
        let server = MetricsServer::new(
            listener,
            metrics.clone(),
            config.basic_auth(),
            task_manager.get_shutdown_rx(),
        );
        task_manager.spawn("MetricsServer", server.run());
        info!("Listening on {}", metrics_addr);

        // =========================================================================
        // 4. Collector
        // =========================================================================
        let collector = Collector::new(client, session, config.update_interval());
        task_manager.spawn("Collector", collector.run(task_manager.get_shutdown_rx()));

        Ok(App {
            task_manager,
            metrics_addr,
            metrics,
        })
    }
}
