//! `kbridge serve`: the hook protocol over stdio.

use anyhow::Result;
use kbridge::bridge::Bridge;
use kbridge::config::BridgeConfig;
use kbridge::hooks;
use std::sync::Arc;
use tokio::io::BufReader;

/// Run the hook loop on stdin/stdout until stdin closes.
pub async fn serve_stdio(config: BridgeConfig) -> Result<()> {
    let bridge = Arc::new(Bridge::from_config(&config)?);
    tracing::info!(transport = %config.remote.transport, "starting kbridge hook server on stdio");

    let health = bridge.client().health_check().await;
    if health.reachable {
        tracing::info!(
            version = health.version.as_deref().unwrap_or("unknown"),
            "substrate reachable"
        );
    } else {
        tracing::warn!(
            error = health.error.as_deref().unwrap_or("unknown"),
            "substrate unreachable at startup; continuing in degraded mode"
        );
    }

    hooks::serve(
        bridge,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;
    tracing::info!("hook server shut down");
    Ok(())
}
