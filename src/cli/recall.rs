use anyhow::Result;

use kbridge::config::BridgeConfig;
use kbridge::knowledge::types::RecallFilters;

/// Recall knowledge from the terminal.
pub async fn recall(config: &BridgeConfig, query: &str, limit: usize) -> Result<()> {
    let client = super::client(config)?;
    let filters = RecallFilters {
        min_confidence: config.recall.min_confidence,
        tags: config.recall.tags.clone(),
    };

    let items = client.recall(query, limit, &filters).await?;
    if items.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", items.len());
    super::print_items(&items);
    Ok(())
}
