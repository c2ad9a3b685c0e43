//! xui-exporter - Prometheus exporter for 3X-UI / X-UI panels

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use xui_exporter::{app::App, cli::Cli, config::Config};

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configuration errors are fatal before anything starts listening.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        init_logging("info");
        error!("Failed to load configuration: {}", err);
        std::process::exit(2);
    });

    init_logging(&config.log_level);

    info!("xui-exporter {} starting up...", env!("CARGO_PKG_VERSION"));
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}", config.listen_address());
    info!(
        "Metrics Basic Auth: {}",
        if config.metrics.protected { "Enabled" } else { "Disabled" }
    );
    info!("Update Interval: {}s", config.update_interval_seconds);
    info!("Request Timeout: {}s", config.request_timeout_seconds);
    info!(
        "Clients Per Inbound: {}",
        match config.clients_bytes_rows {
            0 => "All".to_string(),
            n => format!("Top {}", n),
        }
    );
    info!("Panel URL: {}", config.panel.base_url);
    info!("Panel Flavor: {}", config.panel.flavor);
    info!("Panel Username: {}", config.panel.username);
    if config.panel.insecure_skip_verify {
        info!("TLS Verification: Disabled (INSECURE)");
    }
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(config)
        .install_global_recorder(true)
        .build(shutdown_rx)
        .await?;
    let app_handle = tokio::spawn(app.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Shutting down gracefully...");
    let _ = shutdown_tx.send(true);

    app_handle.await??;
    info!("All tasks shut down. Exiting.");
    Ok(())
}
