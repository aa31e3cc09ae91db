use kbridge::config::RemoteConfig;
use kbridge::error::{BridgeError, ErrorKind};
use kbridge::knowledge::KnowledgeClient;
use kbridge::transport::rest::RestTransport;
use kbridge::transport::rpc::RpcTransport;
use kbridge::transport::{Operation, Transport};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn remote(base_url: &str) -> RemoteConfig {
    RemoteConfig {
        base_url: base_url.to_string(),
        api_key: "test-key".into(),
        ..Default::default()
    }
}

/// Answers JSON-RPC calls with `result`, echoing the request id.
struct RpcResult(Value);

impl Respond for RpcResult {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "result": self.0,
        }))
    }
}

fn tool_text(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

// ── RPC ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rpc_call_parses_tool_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(RpcResult(tool_text(r#"{"session_id": "s-100"}"#)))
        .mount(&server)
        .await;

    let transport = RpcTransport::new(&remote(&server.uri())).unwrap();
    let value = transport
        .invoke(
            Operation::SessionCreate,
            json!({"platform": "openclaw", "channel": "slack"}),
            TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(value, json!({"session_id": "s-100"}));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["method"], "tools/call");
    assert_eq!(body["params"]["name"], "session.create");
    assert_eq!(body["params"]["arguments"]["channel"], "slack");
}

#[tokio::test]
async fn rpc_request_ids_increase() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(RpcResult(tool_text("{}")))
        .mount(&server)
        .await;

    let transport = RpcTransport::new(&remote(&server.uri())).unwrap();
    for _ in 0..3 {
        transport
            .invoke(Operation::Health, json!({}), TIMEOUT)
            .await
            .unwrap();
    }

    let ids: Vec<u64> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap()["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn rpc_non_json_text_is_returned_as_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(RpcResult(tool_text("Session flushed.")))
        .mount(&server)
        .await;

    let transport = RpcTransport::new(&remote(&server.uri())).unwrap();
    let value = transport
        .invoke(Operation::SessionFlush, json!({"session_id": "s-1"}), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(value, Value::String("Session flushed.".into()));
}

#[tokio::test]
async fn rpc_error_field_is_a_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32602, "message": "content must not be empty"}
        })))
        .mount(&server)
        .await;

    let transport = RpcTransport::new(&remote(&server.uri())).unwrap();
    let err = transport
        .invoke(Operation::MemoryStore, json!({"content": ""}), TIMEOUT)
        .await
        .unwrap_err();
    match err {
        BridgeError::Remote { code, message } => {
            assert_eq!(code, -32602);
            assert_eq!(message, "content must not be empty");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn rpc_mismatched_id_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 99,
            "result": {}
        })))
        .mount(&server)
        .await;

    let transport = RpcTransport::new(&remote(&server.uri())).unwrap();
    let err = transport
        .invoke(Operation::Health, json!({}), TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[tokio::test]
async fn rpc_hung_call_times_out_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": tool_text("{}")}))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let transport = RpcTransport::new(&remote(&server.uri())).unwrap();
    let started = Instant::now();
    let err = transport
        .invoke(Operation::MemoryRecall, json!({"query": "x"}), Duration::from_millis(200))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
}

// ── REST ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rest_substitutes_identifiers_into_the_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/s-100/flush"))
        .and(body_json(json!({"compile": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"flushed": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = RestTransport::new(&remote(&server.uri())).unwrap();
    let value = transport
        .invoke(
            Operation::SessionFlush,
            json!({"session_id": "s-100", "compile": false}),
            TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(value, json!({"flushed": 3}));
}

#[tokio::test]
async fn rest_no_content_is_an_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/s-100/finalize"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let transport = RestTransport::new(&remote(&server.uri())).unwrap();
    let value = transport
        .invoke(Operation::SessionFinalize, json!({"session_id": "s-100"}), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(value, json!({}));
}

#[tokio::test]
async fn rest_error_status_is_an_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/memories"))
        .respond_with(ResponseTemplate::new(422).set_body_string("content must not be empty"))
        .mount(&server)
        .await;

    let transport = RestTransport::new(&remote(&server.uri())).unwrap();
    let err = transport
        .invoke(Operation::MemoryStore, json!({"content": ""}), TIMEOUT)
        .await
        .unwrap_err();
    match err {
        BridgeError::Http { status, message } => {
            assert_eq!(status, 422);
            assert!(message.contains("must not be empty"));
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn rest_non_json_body_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let transport = RestTransport::new(&remote(&server.uri())).unwrap();
    let err = transport
        .invoke(Operation::MemoryRecall, json!({"query": "x"}), TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[tokio::test]
async fn rest_refused_connection_is_unreachable() {
    // Bind then drop a listener so the port is very likely closed.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let transport = RestTransport::new(&remote(&format!("http://{addr}"))).unwrap();
    let err = transport
        .invoke(Operation::Health, json!({}), TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unreachable);
}

// ── Knowledge client over REST ───────────────────────────────────────────────

fn rest_client(base_url: &str) -> KnowledgeClient {
    let config = RemoteConfig {
        transport: "rest".into(),
        ..remote(base_url)
    };
    KnowledgeClient::from_config(&config).unwrap()
}

#[tokio::test]
async fn health_check_reports_version_and_database() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "1.4.2",
            "database": {"status": "ok", "latency_ms": 3}
        })))
        .mount(&server)
        .await;

    let status = rest_client(&server.uri()).health_check().await;
    assert!(status.reachable);
    assert_eq!(status.version.as_deref(), Some("1.4.2"));
    assert_eq!(status.database.as_deref(), Some("ok"));
}

#[tokio::test]
async fn health_check_reports_unreachable_instead_of_failing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let status = rest_client(&server.uri()).health_check().await;
    assert!(!status.reachable);
    assert!(status.error.unwrap().contains("503"));
}

#[tokio::test]
async fn recall_and_store_round_trip_through_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/memories/recall"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "memories": [
                {"memory_id": "m-1", "text": "Uses tokio", "score": 0.7, "tags": ["rust"]}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/memories"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"memory_id": "m-2"})))
        .mount(&server)
        .await;

    let client = rest_client(&server.uri());
    let items = client
        .recall("tokio", 5, &Default::default())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "m-1");
    assert_eq!(items[0].content, "Uses tokio");
    assert_eq!(items[0].confidence, 0.7);

    let id = client.store("Uses tokio", &Default::default()).await.unwrap();
    assert_eq!(id, "m-2");
}

#[tokio::test]
async fn search_returns_articles_and_sources() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/knowledge/search"))
        .and(body_json(json!({"query": "deploys", "limit": 3, "include_sources": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "articles": [{"article_id": "a-1", "title": "Deploys", "content": "Two approvals", "score": 0.9}],
            "sources": [{"source_id": "src-1", "content": "transcript", "score": 0.5}]
        })))
        .mount(&server)
        .await;

    let results = rest_client(&server.uri())
        .search("deploys", 3, true)
        .await
        .unwrap();
    assert_eq!(results.articles[0].id, "a-1");
    assert_eq!(results.articles[0].title.as_deref(), Some("Deploys"));
    assert_eq!(results.sources[0].id, "src-1");
}

// ── CLI ──────────────────────────────────────────────────────────────────────

#[cfg(unix)]
mod cli {
    use super::*;
    use kbridge::transport::cli::CliTransport;

    fn shell(script: &str) -> Arc<dyn Transport> {
        let config = RemoteConfig {
            transport: "cli".into(),
            base_url: "http://substrate.test:8420".into(),
            api_key: "cli-key".into(),
            cli_command: "sh".into(),
            cli_args: vec!["-c".into(), script.into(), "sh".into()],
            ..Default::default()
        };
        Arc::new(CliTransport::new(&config))
    }

    #[tokio::test]
    async fn arguments_are_marshaled_into_argv() {
        let transport = shell(r#"echo "$@""#);
        let value = transport
            .invoke(
                Operation::SessionFlush,
                json!({"session_id": "s-1", "compile": true}),
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(
            value,
            Value::String("session flush --compile --session-id=s-1 --json".into())
        );
    }

    #[tokio::test]
    async fn hyphen_leading_content_arrives_as_one_argument() {
        let transport = shell(
            r#"for arg in "$@"; do case "$arg" in --content=*) printf '%s' "${arg#--content=}";; esac; done"#,
        );
        let value = transport
            .invoke(
                Operation::SessionAppend,
                json!({
                    "session_id": "s-1",
                    "role": "assistant",
                    "speaker": "assistant",
                    "content": "- step one",
                }),
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(value, Value::String("- step one".into()));
    }

    #[tokio::test]
    async fn json_stdout_is_parsed_and_env_carries_credentials() {
        let transport = shell(
            r#"printf '{"url":"%s","key":"%s"}' "$SUBSTRATE_URL" "$SUBSTRATE_API_KEY""#,
        );
        let value = transport
            .invoke(Operation::Health, json!({}), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(
            value,
            json!({"url": "http://substrate.test:8420", "key": "cli-key"})
        );
    }

    #[tokio::test]
    async fn failing_process_with_garbage_output_is_a_process_error() {
        let transport = shell("echo 'segfault in compile' >&2; exit 3");
        let err = transport
            .invoke(Operation::KnowledgeCompile, json!({"session_id": "s-1"}), TIMEOUT)
            .await
            .unwrap_err();
        match err {
            BridgeError::Process { exit_code, message } => {
                assert_eq!(exit_code, Some(3));
                assert!(message.contains("segfault"));
            }
            other => panic!("expected process error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_process_with_json_error_is_a_remote_error() {
        let transport = shell(r#"echo '{"error": "session not found"}'; exit 2"#);
        let err = transport
            .invoke(Operation::SessionFinalize, json!({"session_id": "s-9"}), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Remote { code: 2, ref message } if message == "session not found"));
    }

    #[tokio::test]
    async fn hung_process_times_out_promptly() {
        let transport = shell("sleep 10");
        let started = Instant::now();
        let err = transport
            .invoke(Operation::MemoryRecall, json!({}), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn missing_binary_is_unreachable() {
        let config = RemoteConfig {
            cli_command: "/nonexistent/substrate-cli".into(),
            ..Default::default()
        };
        let err = CliTransport::new(&config)
            .invoke(Operation::Health, json!({}), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }
}
