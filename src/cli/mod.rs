pub mod health;
pub mod ingest;
pub mod recall;
pub mod search;
pub mod store;
pub mod sync;

use anyhow::Result;
use kbridge::config::BridgeConfig;
use kbridge::knowledge::types::KnowledgeItem;
use kbridge::knowledge::KnowledgeClient;

/// Build a client for one-shot commands.
fn client(config: &BridgeConfig) -> Result<KnowledgeClient> {
    KnowledgeClient::from_config(&config.remote)
}

/// Print items as a numbered list, the way `recall` and `search` show them.
fn print_items(items: &[KnowledgeItem]) {
    for (i, item) in items.iter().enumerate() {
        let preview = if item.content.chars().count() > 120 {
            let cut: String = item.content.chars().take(120).collect();
            format!("{cut}...")
        } else {
            item.content.clone()
        };

        match &item.title {
            Some(title) => println!(
                "  {}. [{}] {} - {} (confidence: {:.2})",
                i + 1,
                item.domain_label(),
                item.id,
                title,
                item.confidence
            ),
            None => println!(
                "  {}. [{}] {} (confidence: {:.2})",
                i + 1,
                item.domain_label(),
                item.id,
                item.confidence
            ),
        }
        println!("     {}", preview);
        println!();
    }
}
