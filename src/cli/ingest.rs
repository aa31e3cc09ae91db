use anyhow::{Context, Result};
use std::path::Path;

use kbridge::config::BridgeConfig;
use kbridge::knowledge::types::SourceInput;

/// Ingest a local file as a document source.
pub async fn ingest(
    config: &BridgeConfig,
    path: &Path,
    title: Option<String>,
    tags: Vec<String>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    anyhow::ensure!(!content.trim().is_empty(), "{} is empty", path.display());

    let title = title.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });

    let client = super::client(config)?;
    let source = SourceInput {
        title,
        content,
        source_type: "document".into(),
        tags,
    };
    let id = client.ingest_source(&source).await?;
    println!("Ingested {} as source {id}", path.display());
    Ok(())
}
