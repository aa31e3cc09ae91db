//! Uniform call interface over the substrate's three access paths.
//!
//! Provides the [`Transport`] trait and three backends: [`rpc::RpcTransport`]
//! (JSON-RPC over HTTP), [`rest::RestTransport`] (plain REST), and
//! [`cli::CliTransport`] (subprocess per call). The backend is picked once at
//! startup via [`create_transport`] from configuration.

pub mod cli;
pub mod rest;
pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};

/// Remote operations the bridge knows how to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SessionCreate,
    SessionAppend,
    SessionFlush,
    SessionFinalize,
    MemoryStore,
    MemoryRecall,
    KnowledgeSearch,
    KnowledgeCompile,
    SourceIngest,
    Health,
}

impl Operation {
    /// Wire name, e.g. `session.flush`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionCreate => "session.create",
            Self::SessionAppend => "session.append",
            Self::SessionFlush => "session.flush",
            Self::SessionFinalize => "session.finalize",
            Self::MemoryStore => "memory.store",
            Self::MemoryRecall => "memory.recall",
            Self::KnowledgeSearch => "knowledge.search",
            Self::KnowledgeCompile => "knowledge.compile",
            Self::SourceIngest => "source.ingest",
            Self::Health => "health",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execute one logical operation against the substrate.
///
/// Implementations must return within `timeout` (plus scheduling slack) no
/// matter what the remote side does, yielding [`BridgeError::Timeout`] when the
/// deadline passes. They hold no state a caller can observe.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(
        &self,
        operation: Operation,
        arguments: Value,
        timeout: Duration,
    ) -> BridgeResult<Value>;

    /// Short backend label for logs.
    fn name(&self) -> &'static str;
}

/// Create a transport from config.
///
/// Supported: `"rpc"`, `"rest"`, `"cli"`.
pub fn create_transport(config: &crate::config::RemoteConfig) -> Result<Box<dyn Transport>> {
    match config.transport.as_str() {
        "rpc" => Ok(Box::new(rpc::RpcTransport::new(config)?)),
        "rest" => Ok(Box::new(rest::RestTransport::new(config)?)),
        "cli" => Ok(Box::new(cli::CliTransport::new(config))),
        other => anyhow::bail!("unknown transport: {other}. Supported: rpc, rest, cli"),
    }
}

/// Race `call` against `timeout`. The losing future is dropped, which abandons
/// any in-flight request or kills a `kill_on_drop` child process.
pub(crate) async fn with_deadline<F>(
    operation: Operation,
    timeout: Duration,
    call: F,
) -> BridgeResult<Value>
where
    F: Future<Output = BridgeResult<Value>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::Timeout {
            operation: operation.as_str().to_string(),
            after: timeout,
        }),
    }
}

/// Parse a text payload as JSON, keeping it as a plain string when it isn't.
pub(crate) fn parse_or_text(text: &str) -> Value {
    let trimmed = text.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Map a reqwest send failure onto the taxonomy.
pub(crate) fn http_send_error(e: reqwest::Error) -> BridgeError {
    if let Some(status) = e.status() {
        BridgeError::Http {
            status: status.as_u16(),
            message: e.to_string(),
        }
    } else {
        BridgeError::Unreachable(e.to_string())
    }
}

/// First `max` chars of an error body, for log-friendly messages.
pub(crate) fn truncate_body(body: &str, max: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
