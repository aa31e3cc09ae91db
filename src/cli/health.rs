//! CLI `health` command - check the substrate and print a report.

use anyhow::Result;

use kbridge::config::BridgeConfig;

/// Print a health report. Returns an error (non-zero exit) when the substrate
/// can't be reached.
pub async fn health(config: &BridgeConfig) -> Result<()> {
    let client = super::client(config)?;
    let status = client.health_check().await;

    println!("kbridge Health Report");
    println!("=====================");
    println!();
    println!("Transport:         {}", client.transport_name());
    println!("Substrate:         {}", config.remote.base_url);
    println!("Snapshot:          {}", config.resolved_snapshot_path().display());
    println!();

    if !status.reachable {
        println!("Reachable:         NO");
        if let Some(error) = &status.error {
            println!("Error:             {error}");
        }
        anyhow::bail!("substrate unreachable");
    }

    println!("Reachable:         yes");
    println!("Version:           {}", status.version.as_deref().unwrap_or("(unknown)"));
    println!("Database:          {}", status.database.as_deref().unwrap_or("(unknown)"));
    Ok(())
}
