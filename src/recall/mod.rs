//! Per-turn knowledge injection and capture.
//!
//! [`RecallOrchestrator::before_turn`] turns a prompt into extra system
//! context, falling back to the disaster-recovery snapshot when the substrate
//! call fails. [`RecallOrchestrator::after_turn`] stores capture-worthy
//! statements from the finished turn. Neither ever fails the turn.

pub mod capture;

use futures::future::join_all;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::{CaptureConfig, RecallConfig};
use crate::knowledge::types::{KnowledgeItem, RecallFilters, StoreOptions};
use crate::knowledge::KnowledgeClient;
use crate::lifecycle::TurnMessage;
use crate::snapshot::read_snapshot;

/// Tag wrapping injected knowledge. Capture skips text containing it.
pub const CONTEXT_TAG: &str = "relevant-knowledge";

/// Per-item content cap in injected context.
const ITEM_MAX_CHARS: usize = 300;

pub struct RecallOrchestrator {
    client: KnowledgeClient,
    recall: RecallConfig,
    capture: CaptureConfig,
    snapshot_path: PathBuf,
}

impl RecallOrchestrator {
    pub fn new(
        client: KnowledgeClient,
        recall: RecallConfig,
        capture: CaptureConfig,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            client,
            recall,
            capture,
            snapshot_path,
        }
    }

    /// Context to prepend for the coming turn, if any.
    pub async fn before_turn(&self, prompt: &str) -> Option<String> {
        if !self.recall.enabled {
            return None;
        }
        let prompt = prompt.trim();
        if prompt.chars().count() < self.recall.min_prompt_chars {
            debug!("prompt too short for recall");
            return None;
        }

        let filters = RecallFilters {
            min_confidence: self.recall.min_confidence,
            tags: self.recall.tags.clone(),
        };
        match self.client.recall(prompt, self.recall.limit, &filters).await {
            Ok(items) if items.is_empty() => None,
            Ok(items) => {
                debug!(count = items.len(), "injecting recalled knowledge");
                Some(format_context(&items))
            }
            Err(e) => {
                warn!(
                    operation = "memory.recall",
                    kind = %e.kind(),
                    error = %e,
                    "recall failed, trying local snapshot"
                );
                self.fallback_context().await
            }
        }
    }

    async fn fallback_context(&self) -> Option<String> {
        match read_snapshot(&self.snapshot_path).await {
            Ok(Some(snapshot)) => Some(format_snapshot_context(
                &snapshot,
                self.recall.fallback_max_chars,
            )),
            Ok(None) => {
                debug!(path = %self.snapshot_path.display(), "no local snapshot available");
                None
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to read local snapshot");
                None
            }
        }
    }

    /// Store capture-worthy statements from a finished turn. Returns how many
    /// were stored. Each store stands alone; one failure doesn't stop the rest.
    pub async fn after_turn(&self, messages: &[TurnMessage], session_id: Option<&str>) -> usize {
        if !self.capture.enabled {
            return 0;
        }
        let candidates = capture::extract_candidates(messages, &self.capture);
        if candidates.is_empty() {
            return 0;
        }

        let stores = candidates.iter().map(|candidate| {
            let options = StoreOptions {
                context: Some(match session_id {
                    Some(id) => format!("auto-captured from {} message in session {id}", candidate.role),
                    None => format!("auto-captured from {} message", candidate.role),
                }),
                importance: Some(self.capture.importance),
                tags: self.capture.tags.clone(),
            };
            async move { self.client.store(&candidate.text, &options).await }
        });

        let mut stored = 0;
        for result in join_all(stores).await {
            match result {
                Ok(id) => {
                    debug!(memory_id = %id, "captured memory");
                    stored += 1;
                }
                Err(e) => warn!(
                    operation = "memory.store",
                    kind = %e.kind(),
                    error = %e,
                    "capture store failed"
                ),
            }
        }
        if stored > 0 {
            info!(stored, candidates = candidates.len(), "turn captured");
        }
        stored
    }
}

/// Bullet list of items, highest confidence first, wrapped in the context tag.
pub fn format_context(items: &[KnowledgeItem]) -> String {
    let mut ranked: Vec<&KnowledgeItem> = items.iter().collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut out = format!("<{CONTEXT_TAG}>\nRelevant knowledge from previous sessions:\n");
    for item in ranked {
        let content = truncate_chars(item.content.trim(), ITEM_MAX_CHARS);
        match item.title.as_deref().filter(|t| !t.is_empty()) {
            Some(title) => out.push_str(&format!(
                "- [{:.2}] {title}: {content}\n",
                item.confidence
            )),
            None => out.push_str(&format!("- [{:.2}] {content}\n", item.confidence)),
        }
    }
    out.push_str(&format!("</{CONTEXT_TAG}>"));
    out
}

/// Wrap snapshot text for injection, capped at `max_chars`.
pub fn format_snapshot_context(snapshot: &str, max_chars: usize) -> String {
    format!(
        "<{CONTEXT_TAG} source=\"snapshot\">\n\
         Live knowledge is unavailable; this is the last local snapshot.\n\
         {}\n</{CONTEXT_TAG}>",
        truncate_chars(snapshot.trim(), max_chars)
    )
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
