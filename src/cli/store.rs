use anyhow::Result;

use kbridge::config::BridgeConfig;
use kbridge::knowledge::types::StoreOptions;

pub async fn store(
    config: &BridgeConfig,
    content: &str,
    tags: Vec<String>,
    importance: Option<f64>,
) -> Result<()> {
    if let Some(importance) = importance {
        anyhow::ensure!(
            (0.0..=1.0).contains(&importance),
            "importance must be between 0.0 and 1.0"
        );
    }

    let client = super::client(config)?;
    let options = StoreOptions {
        context: Some("stored from kbridge CLI".into()),
        importance,
        tags,
    };
    let id = client.store(content, &options).await?;
    println!("Stored memory {id}");
    Ok(())
}
