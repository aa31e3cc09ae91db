//! Disaster-recovery snapshot: a local, human-readable mirror of high-value
//! substrate knowledge, read only when the live substrate can't answer.
//!
//! Every sync rewrites the whole file through a temp file and a rename, so a
//! concurrent reader sees either the previous snapshot or the new one.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SnapshotConfig;
use crate::knowledge::types::{KnowledgeItem, RecallFilters};
use crate::knowledge::KnowledgeClient;

pub struct SnapshotSync {
    client: KnowledgeClient,
    path: PathBuf,
    query: String,
    max_items: usize,
    min_confidence: Option<f64>,
    running: AtomicBool,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotSync {
    pub fn new(client: KnowledgeClient, config: &SnapshotConfig, path: PathBuf) -> Self {
        Self {
            client,
            path,
            query: config.query.clone(),
            max_items: config.max_items,
            min_confidence: config.min_confidence,
            running: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pull the snapshot set and replace the local file. Returns the number of
    /// entries written.
    ///
    /// An empty result leaves the previous snapshot in place.
    pub async fn sync_now(&self) -> Result<usize> {
        let filters = RecallFilters {
            min_confidence: self.min_confidence,
            tags: Vec::new(),
        };
        let mut items = self
            .client
            .recall(&self.query, self.max_items, &filters)
            .await
            .context("snapshot recall failed")?;
        items.truncate(self.max_items);

        if items.is_empty() {
            debug!(path = %self.path.display(), "substrate returned nothing; keeping previous snapshot");
            return Ok(0);
        }

        let document = render_snapshot(&items, Utc::now());
        write_atomic(&self.path, &document).await?;
        Ok(items.len())
    }

    /// Start a sync in the background unless one is already running. Returns
    /// whether a sync was started.
    ///
    /// Failures are logged; the caller never waits on or sees them. Use
    /// [`SnapshotSync::wait_idle`] to let a started sync finish.
    pub fn trigger(self: &Arc<Self>, reason: &'static str) -> bool {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!(reason, "snapshot sync already running, skipped");
            return false;
        }

        let guard = RunningGuard(Arc::clone(self));
        let handle = tokio::spawn(async move {
            let this = &guard.0;
            match this.sync_now().await {
                Ok(count) => info!(
                    reason,
                    entries = count,
                    path = %this.path.display(),
                    "snapshot synced"
                ),
                Err(e) => warn!(reason, error = %format!("{e:#}"), "snapshot sync failed"),
            }
        });
        *self.pending() = Some(handle);
        true
    }

    /// Wait for the most recently triggered sync, if any, to finish.
    pub async fn wait_idle(&self) {
        let handle = self.pending().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "snapshot sync task panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the running flag when a sync task ends, including by panic.
struct RunningGuard(Arc<SnapshotSync>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

/// Render items as a sectioned document: domains in name order, entries most
/// confident first. Output depends only on the inputs.
pub fn render_snapshot(items: &[KnowledgeItem], generated_at: DateTime<Utc>) -> String {
    let mut by_domain: BTreeMap<&str, Vec<&KnowledgeItem>> = BTreeMap::new();
    for item in items {
        by_domain.entry(item.domain_label()).or_default().push(item);
    }

    let mut out = String::new();
    out.push_str("# Knowledge Snapshot\n\n");
    out.push_str(&format!(
        "Generated: {}\n",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(&format!("Entries: {}\n", items.len()));

    for (domain, mut entries) in by_domain {
        entries.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.content.cmp(&b.content))
        });

        out.push_str(&format!("\n## {domain}\n\n"));
        for entry in entries {
            let content = single_line(&entry.content);
            match entry.title.as_deref().filter(|t| !t.is_empty()) {
                Some(title) => out.push_str(&format!(
                    "- [{:.2}] {}: {}\n",
                    entry.confidence,
                    single_line(title),
                    content
                )),
                None => out.push_str(&format!("- [{:.2}] {}\n", entry.confidence, content)),
            }
        }
    }
    out
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Write `contents` to `path` via a sibling temp file and rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("failed to create directory {}", parent.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".into());
    let tmp_path = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));

    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;
    file.write_all(contents.as_bytes())
        .await
        .context("error writing snapshot")?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e).context("failed to rename temp file");
    }
    Ok(())
}

/// Read the last snapshot. A missing or empty file is `None`.
pub async fn read_snapshot(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if contents.trim().is_empty() => Ok(None),
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}
