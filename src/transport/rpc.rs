//! JSON-RPC over HTTP backend.
//!
//! Each call posts a `tools/call` request carrying a fresh id, the operation
//! name, and the argument bag. Tool output arrives as text content that is
//! usually JSON; text that doesn't parse is handed back as a plain string.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{http_send_error, parse_or_text, truncate_body, with_deadline, Operation, Transport};
use crate::config::RemoteConfig;
use crate::error::{BridgeError, BridgeResult};

/// JSON-RPC server-error code used when a tool reports `isError`.
const TOOL_ERROR_CODE: i64 = -32000;

pub struct RpcTransport {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Value,
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl RpcTransport {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        let endpoint = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.rpc_path.trim_start_matches('/')
        );
        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, operation: Operation, arguments: Value) -> BridgeResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {
                "name": operation.as_str(),
                "arguments": arguments,
            }
        });

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(http_send_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(http_send_error)?;

        if !status.is_success() {
            return Err(BridgeError::Http {
                status: status.as_u16(),
                message: truncate_body(&String::from_utf8_lossy(&body), 200),
            });
        }

        let response: RpcResponse = serde_json::from_slice(&body)?;
        if response.id != json!(id) {
            return Err(BridgeError::Parse(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }

        if let Some(error) = response.error {
            return Err(BridgeError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        unwrap_tool_result(response.result.unwrap_or(Value::Null))
    }
}

/// Pull the payload out of an MCP-style `{content: [{type, text}], isError}`
/// result. Results without a content array are returned as they are.
fn unwrap_tool_result(result: Value) -> BridgeResult<Value> {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return Ok(result);
    };

    let text: String = content
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(BridgeError::Remote {
            code: TOOL_ERROR_CODE,
            message: truncate_body(&text, 200),
        });
    }

    if text.trim().is_empty() {
        return Ok(json!({}));
    }
    Ok(parse_or_text(&text))
}

#[async_trait]
impl Transport for RpcTransport {
    async fn invoke(
        &self,
        operation: Operation,
        arguments: Value,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        with_deadline(operation, timeout, self.call(operation, arguments)).await
    }

    fn name(&self) -> &'static str {
        "rpc"
    }
}
