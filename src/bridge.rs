//! The [`Bridge`]: session tracking, recall/capture, and snapshot sync wired
//! to host lifecycle events.

use std::sync::Arc;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::knowledge::KnowledgeClient;
use crate::lifecycle::{LifecycleHandler, TurnMessage};
use crate::recall::RecallOrchestrator;
use crate::session::SessionTracker;
use crate::snapshot::SnapshotSync;

pub struct Bridge {
    client: KnowledgeClient,
    tracker: Arc<SessionTracker>,
    orchestrator: RecallOrchestrator,
    snapshot: Arc<SnapshotSync>,
    platform: String,
    sync_on_session_end: bool,
}

impl Bridge {
    /// Wire every component onto one shared client.
    pub fn new(client: KnowledgeClient, config: &BridgeConfig) -> Self {
        let snapshot_path = config.resolved_snapshot_path();
        Self {
            tracker: Arc::new(SessionTracker::new(client.clone(), &config.session)),
            orchestrator: RecallOrchestrator::new(
                client.clone(),
                config.recall.clone(),
                config.capture.clone(),
                snapshot_path.clone(),
            ),
            snapshot: Arc::new(SnapshotSync::new(
                client.clone(),
                &config.snapshot,
                snapshot_path,
            )),
            client,
            platform: config.session.platform.clone(),
            sync_on_session_end: config.snapshot.sync_on_session_end,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> anyhow::Result<Self> {
        Ok(Self::new(KnowledgeClient::from_config(&config.remote)?, config))
    }

    pub fn client(&self) -> &KnowledgeClient {
        &self.client
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    pub fn snapshot(&self) -> &Arc<SnapshotSync> {
        &self.snapshot
    }
}

#[async_trait::async_trait]
impl LifecycleHandler for Bridge {
    async fn on_session_start(&self, key: &str, platform: &str, channel: &str) {
        self.tracker.session_start(key, platform, channel).await;
    }

    async fn on_message_received(&self, key: &str, speaker: &str, content: &str) {
        self.tracker.append(key, "user", speaker, content).await;
    }

    async fn on_message_sent(&self, key: &str, speaker: &str, content: &str) {
        self.tracker.append(key, "assistant", speaker, content).await;
    }

    async fn on_before_compaction(&self, key: &str) {
        self.tracker.flush(key).await;
        self.snapshot.trigger("compaction");
    }

    async fn on_session_end(&self, key: &str) {
        self.tracker.finalize(key).await;
        if self.sync_on_session_end {
            self.snapshot.trigger("session_end");
        }
    }

    async fn on_subagent_spawned(&self, parent_key: &str, child_key: &str, label: &str) {
        self.tracker.spawn_child(parent_key, child_key, label).await;
    }

    async fn on_subagent_ended(&self, child_key: &str) {
        self.tracker.end_child(child_key).await;
    }

    async fn on_before_agent_start(&self, key: &str, prompt: &str) -> Option<String> {
        debug!(local_key = %key, "before_agent_start");
        self.orchestrator.before_turn(prompt).await
    }

    async fn on_agent_end(&self, key: &str, messages: &[TurnMessage]) {
        let session_id = self.tracker.remote_id(key);
        self.orchestrator
            .after_turn(messages, session_id.as_deref())
            .await;
    }

    fn default_platform(&self) -> &str {
        &self.platform
    }
}
