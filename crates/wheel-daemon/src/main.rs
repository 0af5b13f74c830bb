//! Steering Wheel Interface - Main Entry Point

use tracing::{info, warn};
use wheel_daemon::{init_logging, DaemonConfig, SerialOpener, Supervisor, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = DaemonConfig::load(&path)?;
    init_logging(&config.logging)?;

    info!("=== Steering Wheel Interface v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Adapter on {} at {} baud, watchdog every {:?}",
        config.serial.device,
        config.serial.baud_rate,
        config.watchdog_interval()
    );

    let opener = SerialOpener::new(config.serial.clone());
    Supervisor::new(&config, opener)
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
