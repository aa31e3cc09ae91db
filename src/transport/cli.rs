//! Subprocess backend: one CLI invocation per call.
//!
//! `session.flush` with `{"session_id": "s-1", "compile": true}` becomes
//! `<command> <cli_args...> session flush --compile --session-id=s-1 --json`.
//! The server address and credential travel in the environment, never argv.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{truncate_body, with_deadline, Operation, Transport};
use crate::config::RemoteConfig;
use crate::error::{BridgeError, BridgeResult};

pub const URL_ENV: &str = "SUBSTRATE_URL";
pub const API_KEY_ENV: &str = "SUBSTRATE_API_KEY";

pub struct CliTransport {
    command: String,
    prefix_args: Vec<String>,
    base_url: String,
    api_key: String,
}

/// Flatten an argument object into `--flag=value` entries, sorted by key.
///
/// Keys become kebab-case flags. `true` is a bare flag, `false` and `null` are
/// dropped, arrays of scalars are comma-joined, nested objects are passed as JSON.
pub fn marshal_args(arguments: &Value) -> BridgeResult<Vec<String>> {
    let map = match arguments {
        Value::Object(map) => map,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(BridgeError::Parse(format!(
                "CLI arguments must be an object, got {other}"
            )))
        }
    };

    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut argv = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let flag = format!("--{}", key.replace('_', "-"));
        // `--flag=value` keeps values that start with `-` from parsing as flags.
        let joined = match value {
            Value::Null | Value::Bool(false) => continue,
            Value::Bool(true) => {
                argv.push(flag);
                continue;
            }
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Array(items) if items.is_empty() => continue,
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => value.to_string(),
        };
        argv.push(format!("{flag}={joined}"));
    }
    Ok(argv)
}

impl CliTransport {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            command: config.cli_command.clone(),
            prefix_args: config.cli_args.clone(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn call(&self, operation: Operation, arguments: Value) -> BridgeResult<Value> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.prefix_args)
            .args(operation.as_str().split('.'))
            .args(marshal_args(&arguments)?)
            .arg("--json")
            .env(URL_ENV, &self.base_url)
            .env(API_KEY_ENV, &self.api_key)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            BridgeError::Unreachable(format!("failed to spawn `{}`: {e}", self.command))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        let parsed = serde_json::from_str::<Value>(stdout).ok();

        if output.status.success() {
            return Ok(match parsed {
                Some(value) => value,
                None if stdout.is_empty() => json!({}),
                None => Value::String(stdout.to_string()),
            });
        }

        match parsed {
            Some(value) => match value.get("error") {
                Some(error) => Err(BridgeError::Remote {
                    code: i64::from(output.status.code().unwrap_or(-1)),
                    message: error
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string()),
                }),
                None => Ok(value),
            },
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = if stderr.trim().is_empty() { stdout } else { stderr.trim() };
                Err(BridgeError::Process {
                    exit_code: output.status.code(),
                    message: truncate_body(detail, 200),
                })
            }
        }
    }
}

#[async_trait]
impl Transport for CliTransport {
    async fn invoke(
        &self,
        operation: Operation,
        arguments: Value,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        with_deadline(operation, timeout, self.call(operation, arguments)).await
    }

    fn name(&self) -> &'static str {
        "cli"
    }
}
