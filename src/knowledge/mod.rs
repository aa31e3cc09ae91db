//! Typed operations over a [`Transport`].
//!
//! [`KnowledgeClient`] shapes arguments for each remote operation and unwraps
//! the normalized result into the type the caller expects. It never retries:
//! recall wants fresh answers and session flushes must not be duplicated, so
//! retry policy is left to whoever calls.

pub mod types;

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{create_transport, Operation, Transport};
use types::{
    items_from_values, CompileOutcome, HealthStatus, KnowledgeItem, RecallFilters, SearchResults,
    SourceInput, StoreOptions,
};

#[derive(Clone)]
pub struct KnowledgeClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    compile_timeout: Duration,
    health_timeout: Duration,
}

impl KnowledgeClient {
    pub fn new(transport: Arc<dyn Transport>, config: &RemoteConfig) -> Self {
        Self {
            transport,
            timeout: config.default_timeout(),
            compile_timeout: config.compile_timeout(),
            health_timeout: config.health_timeout(),
        }
    }

    /// Build the configured transport and wrap it.
    pub fn from_config(config: &RemoteConfig) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::from(create_transport(config)?);
        Ok(Self::new(transport, config))
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    async fn call(&self, operation: Operation, arguments: Value) -> BridgeResult<Value> {
        self.transport
            .invoke(operation, arguments, self.timeout)
            .await
    }

    /// `session.create`. Returns the remote session id.
    pub async fn create_session(
        &self,
        platform: &str,
        channel: &str,
        metadata: Value,
        parent_session_id: Option<&str>,
    ) -> BridgeResult<String> {
        let mut args = json!({
            "platform": platform,
            "channel": channel,
            "metadata": metadata,
        });
        if let Some(parent) = parent_session_id {
            args["parent_session_id"] = json!(parent);
        }
        let value = self.call(Operation::SessionCreate, args).await?;
        extract_id(&value, &["session_id", "id"])
    }

    /// `session.append`.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: &str,
        speaker: &str,
        content: &str,
    ) -> BridgeResult<()> {
        self.call(
            Operation::SessionAppend,
            json!({
                "session_id": session_id,
                "role": role,
                "speaker": speaker,
                "content": content,
            }),
        )
        .await?;
        Ok(())
    }

    /// `session.flush`. Turns buffered session content into a source record.
    /// Repeated flushes with nothing new are deduplicated by the substrate.
    pub async fn flush_session(&self, session_id: &str, compile: bool) -> BridgeResult<()> {
        self.call(
            Operation::SessionFlush,
            json!({"session_id": session_id, "compile": compile}),
        )
        .await?;
        Ok(())
    }

    /// `session.finalize`.
    pub async fn finalize_session(&self, session_id: &str) -> BridgeResult<()> {
        self.call(Operation::SessionFinalize, json!({"session_id": session_id}))
            .await?;
        Ok(())
    }

    /// `knowledge.compile` for one session's sources. Uses the long compile timeout.
    pub async fn compile(&self, session_id: &str) -> BridgeResult<CompileOutcome> {
        let value = self
            .transport
            .invoke(
                Operation::KnowledgeCompile,
                json!({"session_id": session_id}),
                self.compile_timeout,
            )
            .await?;

        let article_ids = match value.get("articles").and_then(Value::as_array) {
            Some(articles) => articles
                .iter()
                .filter_map(|a| match a {
                    Value::String(id) => Some(id.clone()),
                    other => other.get("id").and_then(Value::as_str).map(str::to_string),
                })
                .collect(),
            None => Vec::new(),
        };
        Ok(CompileOutcome { article_ids })
    }

    /// `memory.store`. Returns the new memory id.
    pub async fn store(&self, content: &str, options: &StoreOptions) -> BridgeResult<String> {
        let mut args = Map::new();
        args.insert("content".into(), json!(content));
        if let Some(context) = &options.context {
            args.insert("context".into(), json!(context));
        }
        if let Some(importance) = options.importance {
            args.insert("importance".into(), json!(importance));
        }
        if !options.tags.is_empty() {
            args.insert("tags".into(), json!(options.tags));
        }

        let value = self.call(Operation::MemoryStore, Value::Object(args)).await?;
        extract_id(&value, &["memory_id", "id"])
    }

    /// `memory.recall`. An empty result is a normal outcome, not an error.
    pub async fn recall(
        &self,
        query: &str,
        limit: usize,
        filters: &RecallFilters,
    ) -> BridgeResult<Vec<KnowledgeItem>> {
        let mut args = Map::new();
        args.insert("query".into(), json!(query));
        args.insert("limit".into(), json!(limit));
        if let Some(min) = filters.min_confidence {
            args.insert("min_confidence".into(), json!(min));
        }
        if !filters.tags.is_empty() {
            args.insert("tags".into(), json!(filters.tags));
        }

        let value = self.call(Operation::MemoryRecall, Value::Object(args)).await?;
        unwrap_items(value, &["memories", "items", "results"])
    }

    /// `knowledge.search`.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        include_sources: bool,
    ) -> BridgeResult<SearchResults> {
        let value = self
            .call(
                Operation::KnowledgeSearch,
                json!({
                    "query": query,
                    "limit": limit,
                    "include_sources": include_sources,
                }),
            )
            .await?;

        match value {
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            Value::Null => Ok(SearchResults::default()),
            other => Err(BridgeError::Parse(format!(
                "knowledge.search returned {}",
                kind_of(&other)
            ))),
        }
    }

    /// `source.ingest`. Returns the new source id.
    pub async fn ingest_source(&self, source: &SourceInput) -> BridgeResult<String> {
        let value = self
            .call(Operation::SourceIngest, serde_json::to_value(source)?)
            .await?;
        extract_id(&value, &["source_id", "id"])
    }

    /// Probe the substrate with the short health timeout.
    pub async fn health_check(&self) -> HealthStatus {
        match self
            .transport
            .invoke(Operation::Health, json!({}), self.health_timeout)
            .await
        {
            Ok(value) => HealthStatus {
                reachable: true,
                version: value.get("version").and_then(label),
                database: value.get("database").and_then(label),
                error: None,
            },
            Err(e) => HealthStatus {
                reachable: false,
                error: Some(e.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Render a health field that may be a string or a `{status: ...}` object.
fn label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        Value::Object(map) => map
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Find an identifier in a response: the first of `keys` present as a string or
/// number, or a bare single-token text response.
fn extract_id(value: &Value, keys: &[&str]) -> BridgeResult<String> {
    match value {
        Value::Object(map) => keys
            .iter()
            .find_map(|key| match map.get(*key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| {
                BridgeError::Parse(format!("response has none of the fields {keys:?}"))
            }),
        Value::String(s) if !s.is_empty() && !s.contains(char::is_whitespace) => Ok(s.clone()),
        other => Err(BridgeError::Parse(format!(
            "expected an identifier, got {}",
            kind_of(other)
        ))),
    }
}

/// Accept a bare array, or an object holding the array under one of `keys`.
fn unwrap_items(value: Value, keys: &[&str]) -> BridgeResult<Vec<KnowledgeItem>> {
    let list = match value {
        Value::Array(list) => list,
        Value::Null => return Ok(Vec::new()),
        Value::Object(mut map) => {
            if map.is_empty() {
                return Ok(Vec::new());
            }
            match keys.iter().find_map(|key| map.remove(*key)) {
                Some(Value::Null) => return Ok(Vec::new()),
                Some(Value::Array(list)) => list,
                Some(other) => {
                    return Err(BridgeError::Parse(format!(
                        "expected a list of items, got {}",
                        kind_of(&other)
                    )))
                }
                None => {
                    return Err(BridgeError::Parse(format!(
                        "response has none of the fields {keys:?}"
                    )))
                }
            }
        }
        other => {
            return Err(BridgeError::Parse(format!(
                "expected a list of items, got {}",
                kind_of(&other)
            )))
        }
    };
    Ok(items_from_values(list))
}
