#![allow(dead_code)]

use async_trait::async_trait;
use kbridge::config::{RemoteConfig, SessionConfig};
use kbridge::error::BridgeResult;
use kbridge::knowledge::KnowledgeClient;
use kbridge::session::SessionTracker;
use kbridge::transport::{Operation, Transport};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Handler = Box<dyn Fn(Operation, &Value) -> BridgeResult<Value> + Send + Sync>;

/// In-process stand-in for the substrate. Records every call and answers
/// through a scripted handler.
pub struct FakeTransport {
    calls: Mutex<Vec<(Operation, Value)>>,
    handler: Handler,
    delay: Duration,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(Operation, &Value) -> BridgeResult<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_delay(Duration::ZERO, handler)
    }

    /// Like `new`, but every call sleeps for `delay` before answering.
    pub fn with_delay(
        delay: Duration,
        handler: impl Fn(Operation, &Value) -> BridgeResult<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
            delay,
        })
    }

    /// A healthy substrate: sessions get ids `s-100`, `s-101`, ...; stores get
    /// `m-1`, `m-2`, ...; recall finds nothing.
    pub fn substrate() -> Arc<Self> {
        Self::new(substrate_handler())
    }

    pub fn calls(&self) -> Vec<(Operation, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<Operation> {
        self.calls().into_iter().map(|(op, _)| op).collect()
    }

    pub fn calls_for(&self, operation: Operation) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, args)| args)
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn invoke(
        &self,
        operation: Operation,
        arguments: Value,
        _timeout: Duration,
    ) -> BridgeResult<Value> {
        self.calls.lock().unwrap().push((operation, arguments.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(operation, &arguments)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Handler behind [`FakeTransport::substrate`], for composing custom fakes.
pub fn substrate_handler() -> impl Fn(Operation, &Value) -> BridgeResult<Value> + Send + Sync {
    let next_session = AtomicU64::new(100);
    let next_memory = AtomicU64::new(1);
    move |operation, _args| match operation {
        Operation::SessionCreate => Ok(json!({
            "session_id": format!("s-{}", next_session.fetch_add(1, Ordering::SeqCst))
        })),
        Operation::MemoryStore => Ok(json!({
            "memory_id": format!("m-{}", next_memory.fetch_add(1, Ordering::SeqCst))
        })),
        Operation::MemoryRecall => Ok(json!({"memories": []})),
        Operation::KnowledgeCompile => Ok(json!({"articles": ["a-1"]})),
        _ => Ok(json!({"ok": true})),
    }
}

pub fn client(transport: &Arc<FakeTransport>) -> KnowledgeClient {
    KnowledgeClient::new(transport.clone(), &RemoteConfig::default())
}

pub fn tracker(transport: &Arc<FakeTransport>, compile_on_flush: bool) -> SessionTracker {
    let config = SessionConfig {
        compile_on_flush,
        ..Default::default()
    };
    SessionTracker::new(client(transport), &config)
}

/// A recall item as the substrate sends it.
pub fn item(id: &str, content: &str, confidence: f64) -> Value {
    json!({"id": id, "content": content, "confidence": confidence})
}
