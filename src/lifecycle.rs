//! Host runtime events and the handler capability that consumes them.
//!
//! Events arrive as JSON objects tagged by `event`. [`dispatch`] routes each
//! one to the matching [`LifecycleHandler`] method; only `before_agent_start`
//! produces a reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message of a finished agent turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    SessionStart {
        session_key: Option<String>,
        channel: Option<String>,
        platform: Option<String>,
    },
    MessageReceived {
        session_key: Option<String>,
        channel: Option<String>,
        #[serde(alias = "from")]
        speaker: Option<String>,
        content: String,
    },
    #[serde(alias = "llm_output")]
    MessageSent {
        session_key: Option<String>,
        channel: Option<String>,
        speaker: Option<String>,
        content: String,
    },
    BeforeCompaction {
        session_key: Option<String>,
        channel: Option<String>,
    },
    SessionEnd {
        session_key: Option<String>,
        channel: Option<String>,
    },
    SubagentSpawned {
        parent_session_key: Option<String>,
        child_session_key: String,
        label: Option<String>,
    },
    SubagentEnded {
        child_session_key: String,
    },
    BeforeAgentStart {
        session_key: Option<String>,
        channel: Option<String>,
        prompt: String,
    },
    AgentEnd {
        session_key: Option<String>,
        channel: Option<String>,
        #[serde(default)]
        messages: Vec<TurnMessage>,
    },
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::MessageReceived { .. } => "message_received",
            Self::MessageSent { .. } => "message_sent",
            Self::BeforeCompaction { .. } => "before_compaction",
            Self::SessionEnd { .. } => "session_end",
            Self::SubagentSpawned { .. } => "subagent_spawned",
            Self::SubagentEnded { .. } => "subagent_ended",
            Self::BeforeAgentStart { .. } => "before_agent_start",
            Self::AgentEnd { .. } => "agent_end",
        }
    }

    /// Local key whose tracker state this event reads or changes. Events
    /// sharing a key must be handled in arrival order.
    ///
    /// `subagent_spawned` belongs to the parent, since it reads the parent's
    /// mapping; `subagent_ended` belongs to the child.
    pub fn ordering_key(&self) -> String {
        use crate::session::local_key;

        match self {
            Self::SessionStart {
                session_key,
                channel,
                ..
            }
            | Self::MessageReceived {
                session_key,
                channel,
                ..
            }
            | Self::MessageSent {
                session_key,
                channel,
                ..
            }
            | Self::BeforeCompaction {
                session_key,
                channel,
            }
            | Self::SessionEnd {
                session_key,
                channel,
            }
            | Self::BeforeAgentStart {
                session_key,
                channel,
                ..
            }
            | Self::AgentEnd {
                session_key,
                channel,
                ..
            } => local_key(session_key.as_deref(), channel.as_deref()),
            Self::SubagentSpawned {
                parent_session_key, ..
            } => local_key(parent_session_key.as_deref(), None),
            Self::SubagentEnded { child_session_key } => child_session_key.clone(),
        }
    }
}

/// A line of the hook protocol: an optional correlation id plus the event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub event: HostEvent,
}

/// Reply to `before_agent_start`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub prepend_context: Option<String>,
}

/// Named lifecycle transitions. Implementations must not fail the host:
/// every method completes, whatever the substrate does.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn on_session_start(&self, key: &str, platform: &str, channel: &str);
    async fn on_message_received(&self, key: &str, speaker: &str, content: &str);
    async fn on_message_sent(&self, key: &str, speaker: &str, content: &str);
    async fn on_before_compaction(&self, key: &str);
    async fn on_session_end(&self, key: &str);
    async fn on_subagent_spawned(&self, parent_key: &str, child_key: &str, label: &str);
    async fn on_subagent_ended(&self, child_key: &str);
    /// Extra system context for the coming turn.
    async fn on_before_agent_start(&self, key: &str, prompt: &str) -> Option<String>;
    async fn on_agent_end(&self, key: &str, messages: &[TurnMessage]);
    /// Platform label used when an event doesn't carry one.
    fn default_platform(&self) -> &str;
}

/// Route an event to `handler`. Returns a reply for `before_agent_start` only.
pub async fn dispatch<H>(handler: &H, envelope: EventEnvelope) -> Option<HookReply>
where
    H: LifecycleHandler + ?Sized,
{
    use crate::session::local_key;

    match envelope.event {
        HostEvent::SessionStart {
            session_key,
            channel,
            platform,
        } => {
            let key = local_key(session_key.as_deref(), channel.as_deref());
            let platform = platform.unwrap_or_else(|| handler.default_platform().to_string());
            let channel = channel.unwrap_or_else(|| "unknown".to_string());
            handler.on_session_start(&key, &platform, &channel).await;
            None
        }
        HostEvent::MessageReceived {
            session_key,
            channel,
            speaker,
            content,
        } => {
            let key = local_key(session_key.as_deref(), channel.as_deref());
            let speaker = speaker.unwrap_or_else(|| "user".to_string());
            handler.on_message_received(&key, &speaker, &content).await;
            None
        }
        HostEvent::MessageSent {
            session_key,
            channel,
            speaker,
            content,
        } => {
            let key = local_key(session_key.as_deref(), channel.as_deref());
            let speaker = speaker.unwrap_or_else(|| "assistant".to_string());
            handler.on_message_sent(&key, &speaker, &content).await;
            None
        }
        HostEvent::BeforeCompaction {
            session_key,
            channel,
        } => {
            let key = local_key(session_key.as_deref(), channel.as_deref());
            handler.on_before_compaction(&key).await;
            None
        }
        HostEvent::SessionEnd {
            session_key,
            channel,
        } => {
            let key = local_key(session_key.as_deref(), channel.as_deref());
            handler.on_session_end(&key).await;
            None
        }
        HostEvent::SubagentSpawned {
            parent_session_key,
            child_session_key,
            label,
        } => {
            let parent = local_key(parent_session_key.as_deref(), None);
            let label = label.unwrap_or_else(|| "subagent".to_string());
            handler
                .on_subagent_spawned(&parent, &child_session_key, &label)
                .await;
            None
        }
        HostEvent::SubagentEnded { child_session_key } => {
            handler.on_subagent_ended(&child_session_key).await;
            None
        }
        HostEvent::BeforeAgentStart {
            session_key,
            channel,
            prompt,
        } => {
            let key = local_key(session_key.as_deref(), channel.as_deref());
            let prepend_context = handler.on_before_agent_start(&key, &prompt).await;
            Some(HookReply {
                id: envelope.id,
                prepend_context,
            })
        }
        HostEvent::AgentEnd {
            session_key,
            channel,
            messages,
        } => {
            let key = local_key(session_key.as_deref(), channel.as_deref());
            handler.on_agent_end(&key, &messages).await;
            None
        }
    }
}
