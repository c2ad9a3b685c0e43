//! Periodic collection of panel metrics.
//!
//! One tick acquires a session and then runs the three fetch-and-publish
//! operations in a fixed order. Only a failed login aborts the tick; a failed
//! fetch is reported and the remaining fetches still run.

use crate::panel::{AuthError, FetchError, PanelClient, SessionCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

/// Per-operation results of one completed tick.
#[derive(Debug)]
pub struct CycleReport {
    pub online_users: Result<(), FetchError>,
    pub server_status: Result<(), FetchError>,
    pub inbounds: Result<(), FetchError>,
}

impl CycleReport {
    /// Failed operations with their errors, in execution order.
    pub fn failures(&self) -> Vec<(&'static str, &FetchError)> {
        [
            ("online_users", &self.online_users),
            ("server_status", &self.server_status),
            ("inbounds", &self.inbounds),
        ]
        .into_iter()
        .filter_map(|(operation, result)| result.as_ref().err().map(|e| (operation, e)))
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.online_users.is_ok() && self.server_status.is_ok() && self.inbounds.is_ok()
    }
}

/// Drives collection ticks against one panel.
pub struct Collector {
    client: Arc<PanelClient>,
    session: Arc<SessionCache>,
    interval: Duration,
}

impl Collector {
    pub fn new(client: Arc<PanelClient>, session: Arc<SessionCache>, interval: Duration) -> Self {
        Self {
            client,
            session,
            interval,
        }
    }

    /// Runs a single tick.
    #[instrument(skip_all)]
    pub async fn run_once(&self) -> Result<CycleReport, AuthError> {
        let token = match self.session.get_token(self.client.as_ref()).await {
            Ok(token) => token,
            Err(e) => {
                metrics::counter!("xui_exporter_cycles_total", "outcome" => "auth_failed").increment(1);
                return Err(e);
            }
        };

        let report = CycleReport {
            online_users: self.client.fetch_online_users(&token).await,
            server_status: self.client.fetch_server_status(&token).await,
            inbounds: self.client.fetch_inbounds(&token).await,
        };

        for (operation, e) in report.failures() {
            metrics::counter!("xui_exporter_fetch_errors_total", "operation" => operation).increment(1);
            warn!(operation, error = %e, "Panel fetch failed");
        }
        let outcome = if report.is_complete() { "ok" } else { "partial" };
        metrics::counter!("xui_exporter_cycles_total", "outcome" => outcome).increment(1);

        Ok(report)
    }

    /// Runs ticks every `interval` until the shutdown signal fires. The first
    /// tick runs immediately.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_seconds = self.interval.as_secs(), "Collector started.");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Collector received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Panel login failed, skipping this update");
                    }
                }
            }
        }
        info!("Collector finished.");
    }
}
