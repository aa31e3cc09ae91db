//! Local-key to remote-session tracking.
//!
//! Each host session (or subagent) key moves `Unknown → Active → Finalizing →
//! Unknown`. Unknown is the absence of an entry, so a finished key can be
//! started again. Mappings live in memory only; after a restart every key is
//! unknown and lifecycle calls against it are no-ops.
//!
//! No method here returns an error. Substrate failures are logged and the
//! host's turn carries on.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::knowledge::KnowledgeClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Remote finalize in flight; appends and flushes are skipped.
    Finalizing,
}

/// Association between one local key and one remote session.
#[derive(Debug, Clone)]
pub struct SessionMapping {
    pub local_key: String,
    pub remote_id: String,
    /// Local key of the parent, for subagents whose parent was tracked.
    pub parent_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub platform: String,
    pub channel: String,
    pub state: SessionState,
}

/// Derive the local key for a host event: the session key when present, else
/// the channel, else `default`.
pub fn local_key(session_key: Option<&str>, channel: Option<&str>) -> String {
    match (
        session_key.map(str::trim).filter(|k| !k.is_empty()),
        channel.map(str::trim).filter(|c| !c.is_empty()),
    ) {
        (Some(key), _) => key.to_string(),
        (None, Some(channel)) => format!("channel:{channel}"),
        (None, None) => "default".to_string(),
    }
}

pub struct SessionTracker {
    client: KnowledgeClient,
    compile_on_flush: bool,
    sessions: Mutex<HashMap<String, SessionMapping>>,
}

impl SessionTracker {
    pub fn new(client: KnowledgeClient, config: &SessionConfig) -> Self {
        Self {
            client,
            compile_on_flush: config.compile_on_flush,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The map is only touched in short, non-awaiting sections, so a poisoned
    /// lock still holds consistent entries.
    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionMapping>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remote id for an Active key.
    pub fn remote_id(&self, key: &str) -> Option<String> {
        self.sessions()
            .get(key)
            .filter(|m| m.state == SessionState::Active)
            .map(|m| m.remote_id.clone())
    }

    pub fn mapping(&self, key: &str) -> Option<SessionMapping> {
        self.sessions().get(key).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        self.sessions().len()
    }

    /// Create a remote session for `key` unless one is already tracked.
    pub async fn session_start(&self, key: &str, platform: &str, channel: &str) {
        let tracked = self.sessions().contains_key(key);
        if tracked {
            debug!(local_key = %key, "session already tracked, reusing mapping");
            return;
        }

        let metadata = json!({ "local_key": key });
        match self
            .client
            .create_session(platform, channel, metadata, None)
            .await
        {
            Ok(remote_id) => {
                self.record(key, remote_id, None, platform, channel).await;
            }
            Err(e) => {
                warn!(
                    local_key = %key,
                    operation = "session.create",
                    kind = %e.kind(),
                    error = %e,
                    "could not create remote session; key stays untracked"
                );
            }
        }
    }

    /// Insert a fresh mapping. If a concurrent start won the race, the
    /// redundant remote session is finalized so one id stays tracked per key.
    async fn record(
        &self,
        key: &str,
        remote_id: String,
        parent_key: Option<String>,
        platform: &str,
        channel: &str,
    ) {
        let redundant = match self.sessions().entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(SessionMapping {
                    local_key: key.to_string(),
                    remote_id: remote_id.clone(),
                    parent_key,
                    created_at: Utc::now(),
                    platform: platform.to_string(),
                    channel: channel.to_string(),
                    state: SessionState::Active,
                });
                None
            }
            Entry::Occupied(_) => Some(remote_id.clone()),
        };

        match redundant {
            None => info!(local_key = %key, session_id = %remote_id, "session tracked"),
            Some(extra) => {
                warn!(
                    local_key = %key,
                    session_id = %extra,
                    "key was started concurrently; closing the extra remote session"
                );
                if let Err(e) = self.client.finalize_session(&extra).await {
                    warn!(session_id = %extra, error = %e, "failed to close extra remote session");
                }
            }
        }
    }

    /// Copy one message to the remote session. Unknown keys are skipped.
    pub async fn append(&self, key: &str, role: &str, speaker: &str, content: &str) {
        let Some(remote_id) = self.remote_id(key) else {
            debug!(local_key = %key, "append on untracked key skipped");
            return;
        };
        if content.trim().is_empty() {
            return;
        }

        if let Err(e) = self
            .client
            .append_message(&remote_id, role, speaker, content)
            .await
        {
            warn!(
                local_key = %key,
                session_id = %remote_id,
                operation = "session.append",
                kind = %e.kind(),
                error = %e,
                "append failed"
            );
        }
    }

    /// Flush buffered content into a source record, then compile when
    /// configured. Safe to repeat; the substrate dedupes empty flushes.
    pub async fn flush(&self, key: &str) {
        let Some(remote_id) = self.remote_id(key) else {
            debug!(local_key = %key, "flush on untracked key skipped");
            return;
        };

        if let Err(e) = self.client.flush_session(&remote_id, false).await {
            warn!(
                local_key = %key,
                session_id = %remote_id,
                operation = "session.flush",
                kind = %e.kind(),
                error = %e,
                "flush failed"
            );
            return;
        }
        info!(local_key = %key, session_id = %remote_id, "session flushed");

        if !self.compile_on_flush {
            return;
        }
        match self.client.compile(&remote_id).await {
            Ok(outcome) => info!(
                session_id = %remote_id,
                articles = outcome.article_ids.len(),
                "session compiled"
            ),
            // Sources are durable; the next flush compiles them.
            Err(e) => warn!(
                local_key = %key,
                session_id = %remote_id,
                operation = "knowledge.compile",
                kind = %e.kind(),
                error = %e,
                "flushed but compile failed"
            ),
        }
    }

    /// Finalize the remote session and stop tracking `key`. The mapping is
    /// dropped even if the remote call fails.
    pub async fn finalize(&self, key: &str) {
        let remote_id = {
            let mut sessions = self.sessions();
            match sessions.get_mut(key) {
                Some(mapping) if mapping.state == SessionState::Active => {
                    mapping.state = SessionState::Finalizing;
                    mapping.remote_id.clone()
                }
                _ => {
                    debug!(local_key = %key, "finalize on untracked key skipped");
                    return;
                }
            }
        };

        if let Err(e) = self.client.finalize_session(&remote_id).await {
            warn!(
                local_key = %key,
                session_id = %remote_id,
                operation = "session.finalize",
                kind = %e.kind(),
                error = %e,
                "finalize failed"
            );
        }

        let mut sessions = self.sessions();
        if sessions
            .get(key)
            .is_some_and(|m| m.remote_id == remote_id)
        {
            sessions.remove(key);
        }
        drop(sessions);
        info!(local_key = %key, session_id = %remote_id, "session finalized");
    }

    /// Create a remote session for a subagent, linked to the parent's remote
    /// session when the parent is tracked. An untracked parent yields an
    /// unlinked child session.
    pub async fn spawn_child(&self, parent_key: &str, child_key: &str, label: &str) {
        let tracked = self.sessions().contains_key(child_key);
        if tracked {
            debug!(local_key = %child_key, "subagent already tracked");
            return;
        }

        let parent = self
            .mapping(parent_key)
            .filter(|m| m.state == SessionState::Active);
        if parent.is_none() {
            info!(
                parent_key = %parent_key,
                child_key = %child_key,
                "parent session not tracked; subagent session will be unlinked"
            );
        }

        let (platform, channel) = match &parent {
            Some(p) => (p.platform.clone(), p.channel.clone()),
            None => ("subagent".to_string(), "subagent".to_string()),
        };
        let metadata = json!({
            "local_key": child_key,
            "label": label,
            "subagent": true,
        });

        match self
            .client
            .create_session(
                &platform,
                &channel,
                metadata,
                parent.as_ref().map(|p| p.remote_id.as_str()),
            )
            .await
        {
            Ok(remote_id) => {
                self.record(
                    child_key,
                    remote_id,
                    parent.map(|p| p.local_key),
                    &platform,
                    &channel,
                )
                .await;
            }
            Err(e) => warn!(
                parent_key = %parent_key,
                local_key = %child_key,
                operation = "session.create",
                kind = %e.kind(),
                error = %e,
                "could not create subagent session"
            ),
        }
    }

    pub async fn end_child(&self, child_key: &str) {
        self.finalize(child_key).await;
    }
}
