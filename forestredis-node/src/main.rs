//! # ForestRedis Node
//!
//! Standalone node joining the ForestRedis messaging network. It subscribes
//! to the configured channels and logs every message it receives.
//!
//! ## Configuration
//!
//! - `FORESTREDIS_CONFIG`: configuration file path (default `config.yml`)
//! - `FOREST_REDIS__*`: overrides, see `forestredis_shared::config`
//! - `RUST_LOG`: log filter
//!
//! ## Signals
//!
//! - `SIGHUP` (unix): reload the configuration, keeping subscribed channels
//! - `Ctrl-C`: close the manager and exit
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p forestredis-node
//! ```

use forestredis_node::node::Node;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forestredis_node=debug,forestredis_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "ForestRedis Node v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config_path = std::env::var("FORESTREDIS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let node = Node::new(Some(config_path), Vec::new());

    let shutdown = node.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received, exiting...");
        shutdown.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let reload = node.reload_handle();
        let mut hangup = signal(SignalKind::hangup())?;
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                reload.notify_one();
            }
        });
    }

    node.run().await
}
