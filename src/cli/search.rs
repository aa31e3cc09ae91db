use anyhow::Result;

use kbridge::config::BridgeConfig;

/// Search compiled knowledge from the terminal.
pub async fn search(
    config: &BridgeConfig,
    query: &str,
    limit: usize,
    include_sources: bool,
) -> Result<()> {
    let client = super::client(config)?;
    let results = client.search(query, limit, include_sources).await?;

    if results.articles.is_empty() && results.sources.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Articles ({}):\n", results.articles.len());
    super::print_items(&results.articles);

    if include_sources {
        println!("Sources ({}):\n", results.sources.len());
        super::print_items(&results.sources);
    }
    Ok(())
}
