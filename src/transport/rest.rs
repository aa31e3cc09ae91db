//! Plain REST backend.
//!
//! Every operation has a fixed route. Path placeholders such as
//! `{session_id}` are filled from the argument bag and removed from the body.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

use super::{http_send_error, truncate_body, with_deadline, Operation, Transport};
use crate::config::RemoteConfig;
use crate::error::{BridgeError, BridgeResult};

pub struct RestTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Method and path template for each operation.
fn route(operation: Operation) -> (Method, &'static str) {
    match operation {
        Operation::SessionCreate => (Method::POST, "/api/sessions"),
        Operation::SessionAppend => (Method::POST, "/api/sessions/{session_id}/messages"),
        Operation::SessionFlush => (Method::POST, "/api/sessions/{session_id}/flush"),
        Operation::SessionFinalize => (Method::POST, "/api/sessions/{session_id}/finalize"),
        Operation::MemoryStore => (Method::POST, "/api/memories"),
        Operation::MemoryRecall => (Method::POST, "/api/memories/recall"),
        Operation::KnowledgeSearch => (Method::POST, "/api/knowledge/search"),
        Operation::KnowledgeCompile => (Method::POST, "/api/sessions/{session_id}/compile"),
        Operation::SourceIngest => (Method::POST, "/api/sources"),
        Operation::Health => (Method::GET, "/api/health"),
    }
}

/// Substitute `{name}` placeholders in `template` with string values taken
/// out of `arguments`.
fn fill_path(template: &str, arguments: &mut Value) -> BridgeResult<String> {
    let mut path = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = arguments
            .as_object_mut()
            .and_then(|args| args.remove(name))
            .ok_or_else(|| BridgeError::Parse(format!("missing path argument `{name}`")))?;
        let value = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        path.push_str(&rest[..start]);
        path.push_str(&value);
        rest = &rest[start + len + 1..];
    }
    path.push_str(rest);
    Ok(path)
}

impl RestTransport {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn call(&self, operation: Operation, mut arguments: Value) -> BridgeResult<Value> {
        let (method, template) = route(operation);
        let path = fill_path(template, &mut arguments)?;
        let url = format!("{}{path}", self.base_url);

        let mut builder = self.http.request(method.clone(), &url);
        if method != Method::GET {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&arguments)?);
        }
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

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(json!({}));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn invoke(
        &self,
        operation: Operation,
        arguments: Value,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        with_deadline(operation, timeout, self.call(operation, arguments)).await
    }

    fn name(&self) -> &'static str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_path_moves_identifiers_out_of_the_body() {
        let mut args = json!({"session_id": "s-100", "compile": false});
        let path = fill_path("/api/sessions/{session_id}/flush", &mut args).unwrap();
        assert_eq!(path, "/api/sessions/s-100/flush");
        assert_eq!(args, json!({"compile": false}));
    }

    #[test]
    fn fill_path_without_placeholders_is_identity() {
        let mut args = json!({"query": "x"});
        assert_eq!(fill_path("/api/memories/recall", &mut args).unwrap(), "/api/memories/recall");
        assert_eq!(args, json!({"query": "x"}));
    }

    #[test]
    fn fill_path_reports_missing_identifier() {
        let mut args = json!({});
        let err = fill_path("/api/sessions/{session_id}/finalize", &mut args).unwrap_err();
        assert!(err.to_string().contains("session_id"));
    }
}
