//! End-to-end HTTP coverage for the gateway router (spec §8). Each test
//! drives `runtime_server::routes::build_router` through
//! `tower::ServiceExt::oneshot` against wiremock-stubbed backends, mirroring
//! `goose-server`'s own `pricing_api_test.rs` harness.

use std::io::{Read, Write};
use std::net::TcpListener as StdTcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use runtime_core::config::{LlamaCppConfig, RuntimeConfig, SessionStoreConfig, SessionStoreKind};
use runtime_server::routes::build_router;
use runtime_server::state::AppState;

fn base_config() -> RuntimeConfig {
    RuntimeConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: 0,
        default_provider: "mnn".to_string(),
        workspace_root: ".".to_string(),
        mcp_hosts: vec![],
        session_store: SessionStoreConfig {
            kind: SessionStoreKind::Memory,
            path: None,
            endpoint: None,
            password: None,
            db: 0,
            namespace: "default".to_string(),
        },
        llama_cpp: LlamaCppConfig {
            model: None,
            n_batch: None,
            n_ubatch: None,
            flash_attn: false,
            unload_after_chat: false,
        },
        lmdeploy_host: None,
        mnn_host: None,
        ollama_host: None,
        request_timeout: Duration::from_secs(5),
        session_ttl_secs: 86_400,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Mounts a `/v1/chat/completions` mock that echoes `mock:n={messages.len()}
/// last={last message text}`, matching the reference mock backend's shape
/// closely enough for assertions that key off the echoed last message.
async fn mount_echo_backend(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(|req: &wiremock::Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            let messages = body["messages"].as_array().cloned().unwrap_or_default();
            let last = messages
                .last()
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let mut content = format!("mock:n={} last={}", messages.len(), last);
            if let Some(t) = body.get("temperature") {
                content += &format!(" temp={t}");
            }
            if let Some(t) = body.get("top_p") {
                content += &format!(" top_p={t}");
            }
            ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion",
                "created": 0,
                "model": "mock-model",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop",
                }],
            }))
        })
        .mount(server)
        .await;
}

#[tokio::test]
async fn basic_round_trip_returns_session_header_and_echoed_content() {
    let server = MockServer::start().await;
    mount_echo_backend(&server).await;

    let mut config = base_config();
    config.mnn_host = Some(server.uri());
    let app = build_router(AppState::build(config).unwrap());

    let response = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "mock-model", "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-session-id").is_some());
    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], "mock:n=1 last=hi");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn session_continuation_hydrates_prior_turns() {
    let server = MockServer::start().await;
    mount_echo_backend(&server).await;

    let mut config = base_config();
    config.mnn_host = Some(server.uri());
    let app = build_router(AppState::build(config).unwrap());

    let first = app
        .clone()
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "mock-model", "messages": [{"role": "user", "content": "first"}]}),
        ))
        .await
        .unwrap();
    let session_id = first
        .headers()
        .get("x-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let mut request = post(
        "/v1/chat/completions",
        json!({"model": "mock-model", "messages": [{"role": "user", "content": "second"}]}),
    );
    request
        .headers_mut()
        .insert("x-session-id", session_id.parse().unwrap());
    let second = app.oneshot(request).await.unwrap();
    let body = body_json(second).await;
    // Hydrated history carries the first turn's user+assistant messages ahead
    // of "second", so the backend sees 3 messages, not 1.
    assert_eq!(body["choices"][0]["message"]["content"], "mock:n=3 last=second");
}

#[tokio::test]
async fn provider_prefixed_model_routes_to_the_named_backend() {
    let mnn = MockServer::start().await;
    let lmdeploy = MockServer::start().await;
    mount_echo_backend(&mnn).await;
    mount_echo_backend(&lmdeploy).await;

    let mut config = base_config();
    config.mnn_host = Some(mnn.uri());
    config.lmdeploy_host = Some(lmdeploy.uri());
    let app = build_router(AppState::build(config).unwrap());

    app.oneshot(post(
        "/v1/chat/completions",
        json!({"model": "lmdeploy:mock-model", "messages": [{"role": "user", "content": "hi"}]}),
    ))
    .await
    .unwrap();

    assert_eq!(mnn.received_requests().await.unwrap().len(), 0);
    assert_eq!(lmdeploy.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_provider_surfaces_as_502() {
    let config = base_config();
    let app = build_router(AppState::build(config).unwrap());

    let response = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "llama_cpp:any", "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "provider_unavailable");
}

#[tokio::test]
async fn glm_model_forces_sampling_override_regardless_of_request() {
    let server = MockServer::start().await;
    mount_echo_backend(&server).await;

    let mut config = base_config();
    config.mnn_host = Some(server.uri());
    let app = build_router(AppState::build(config).unwrap());

    let response = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({
                "model": "glm-mock",
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 0.1,
                "top_p": 0.2,
            }),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("temp=0.7"), "got: {content}");
    assert!(content.contains("top_p=1.0"), "got: {content}");
}

#[tokio::test]
async fn tool_call_round_trip_embeds_tool_result_marker() {
    let dir = tempfile::tempdir().unwrap();
    let fixed_path = dir.path().join("notes.txt");
    tokio::fs::write(&fixed_path, "hello from disk").await.unwrap();

    let server = MockServer::start().await;
    // A stateful responder: turn 1 replies with a tag-dialect `ide.read_file`
    // call against a real on-disk file; every later turn echoes the last
    // message's text back, so the `TOOL_RESULT ide.read_file` marker the
    // orchestrator embeds surfaces directly in the final response body.
    let turn = Arc::new(Mutex::new(0u32));
    let fixed_path_str = fixed_path.to_string_lossy().to_string();
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(move |req: &wiremock::Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            let messages = body["messages"].as_array().cloned().unwrap_or_default();
            let mut n = turn.lock().unwrap();
            *n += 1;
            let content = if *n == 1 {
                format!(
                    r#"<tool_call>{{"name":"ide.read_file","arguments":{{"path":"{fixed_path_str}"}}}}</tool_call>"#
                )
            } else {
                messages
                    .last()
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string()
            };
            ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-tool",
                "object": "chat.completion",
                "created": 0,
                "model": "fake-tool",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop",
                }],
            }))
        })
        .mount(&server)
        .await;

    let mut config = base_config();
    config.mnn_host = Some(server.uri());
    let app = build_router(AppState::build(config).unwrap());

    let response = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({
                "model": "mnn:fake-tool",
                "messages": [{"role": "user", "content": "please read the file"}],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "ide.read_file",
                        "parameters": {"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]},
                    },
                }],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("TOOL_RESULT ide.read_file"), "got: {content}");
    assert!(content.contains("ok=true"), "got: {content}");
    assert!(content.contains("hello from disk"), "got: {content}");
}

#[tokio::test]
async fn planner_repairs_bad_arguments_and_records_trace() {
    // Turn 1: assistant asks for `ide.hover` with a schema-violating payload
    // (missing `character`). Turn 2: the planner's own side-request for
    // repaired JSON. Turn 3: the main loop's retried call, now valid. Turn 4:
    // final reply once the tool result rounds back.
    let turn = Arc::new(Mutex::new(0u32));
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(move |req: &wiremock::Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            let messages = body["messages"].as_array().cloned().unwrap_or_default();
            let mut n = turn.lock().unwrap();
            *n += 1;
            let content = match *n {
                1 => r#"<tool_call>{"name":"ide.hover","arguments":{"uri":"file:///a","line":1}}</tool_call>"#.to_string(),
                2 => json!({"uri": "file:///a", "line": 1, "character": 4}).to_string(),
                _ => messages
                    .last()
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            };
            ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-plan",
                "object": "chat.completion",
                "created": 0,
                "model": "fake-tool",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop",
                }],
            }))
        })
        .mount(&server)
        .await;

    let mut config = base_config();
    config.mnn_host = Some(server.uri());
    let app = build_router(AppState::build(config).unwrap());

    let response = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({
                "model": "fake-tool",
                "trace": true,
                "planner": {"enabled": true, "max_plan_steps": 2, "max_rewrites": 1},
                "messages": [{"role": "user", "content": "hover please"}],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "ide.hover",
                        "parameters": {
                            "type": "object",
                            "properties": {
                                "uri": {"type": "string"},
                                "line": {"type": "integer"},
                                "character": {"type": "integer"},
                            },
                            "required": ["uri", "line", "character"],
                        },
                    },
                }],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let trace = response
        .headers()
        .get("x-runtime-trace")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(trace.contains("\"used_planner\":true"));
    assert!(trace.contains("\"plan_rewrites\":1"));
    let body = body_json(response).await;
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("TOOL_RESULT ide.hover"), "got: {content}");
}

#[tokio::test]
async fn empty_messages_and_unknown_named_tool_choice_are_rejected() {
    let config = base_config();
    let app = build_router(AppState::build(config).unwrap());

    let empty = app
        .clone()
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "mock-model", "messages": []}),
        ))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let bad_choice = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({
                "model": "mock-model",
                "messages": [{"role": "user", "content": "hi"}],
                "tool_choice": {"type": "function", "function": {"name": "nope.tool"}},
            }),
        ))
        .await
        .unwrap();
    assert_eq!(bad_choice.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tool_choice_none_skips_tool_call_detection() {
    // Assistant text matches the tag dialect, but `tool_choice: "none"` means
    // the orchestrator must treat it as ordinary final content.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-noop",
            "object": "chat.completion",
            "created": 0,
            "model": "mock-model",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": r#"<tool_call>{"name":"ide.read_file","arguments":{"path":"a.txt"}}</tool_call>"#,
                },
                "finish_reason": "stop",
            }],
        })))
        .mount(&server)
        .await;

    let mut config = base_config();
    config.mnn_host = Some(server.uri());
    let app = build_router(AppState::build(config).unwrap());

    let response = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({
                "model": "mock-model",
                "tool_choice": "none",
                "messages": [{"role": "user", "content": "hi"}],
                "tools": [{"type": "function", "function": {"name": "ide.read_file", "parameters": {"type": "object"}}}],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["choices"][0]["message"]["content"].as_str().unwrap(),
        r#"<tool_call>{"name":"ide.read_file","arguments":{"path":"a.txt"}}</tool_call>"#
    );
}

/// Minimal RESP server — `GET`/`SET`/`PING` only — good enough to exercise
/// `KvSessionStore` end to end without fabricating a redis dependency. Runs
/// on a std blocking thread since the client side is what needs async.
fn spawn_fake_kv_server() -> String {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let store: Mutex<std::collections::HashMap<String, String>> = Mutex::new(std::collections::HashMap::new());
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(s) => s,
                Err(_) => continue,
            };
            loop {
                let parts = match read_resp_array(&mut stream) {
                    Some(p) => p,
                    None => break,
                };
                let reply = handle_command(&store, &parts);
                if stream.write_all(&reply).is_err() {
                    break;
                }
            }
        }
    });
    addr.to_string()
}

fn read_line(stream: &mut std::net::TcpStream) -> Option<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).ok()?;
        if n == 0 {
            return if line.is_empty() { None } else { Some(String::from_utf8(line).ok()?) };
        }
        if byte[0] == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return String::from_utf8(line).ok();
        }
        line.push(byte[0]);
    }
}

fn read_resp_array(stream: &mut std::net::TcpStream) -> Option<Vec<String>> {
    let header = read_line(stream)?;
    let count: usize = header.strip_prefix('*')?.parse().ok()?;
    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        let len_line = read_line(stream)?;
        let len: usize = len_line.strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0u8; len + 2];
        stream.read_exact(&mut buf).ok()?;
        buf.truncate(len);
        parts.push(String::from_utf8(buf).ok()?);
    }
    Some(parts)
}

fn handle_command(store: &Mutex<std::collections::HashMap<String, String>>, parts: &[String]) -> Vec<u8> {
    let mut store = store.lock().unwrap();
    match parts.first().map(String::as_str) {
        Some("PING") => b"+PONG\r\n".to_vec(),
        Some("GET") => match store.get(&parts[1]) {
            Some(v) => format!("${}\r\n{}\r\n", v.len(), v).into_bytes(),
            None => b"$-1\r\n".to_vec(),
        },
        Some("SET") => {
            store.insert(parts[1].clone(), parts[2].clone());
            b"+OK\r\n".to_vec()
        }
        _ => b"-ERR unknown command\r\n".to_vec(),
    }
}

#[tokio::test]
async fn kv_session_store_round_trips_through_fake_redis() {
    let kv_addr = spawn_fake_kv_server();
    // Give the accept loop's std thread a beat to bind before the first
    // connection attempt lands.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let server = MockServer::start().await;
    mount_echo_backend(&server).await;

    let mut config = base_config();
    config.mnn_host = Some(server.uri());
    config.session_store = SessionStoreConfig {
        kind: SessionStoreKind::MiniMemory,
        path: None,
        endpoint: Some(kv_addr),
        password: None,
        db: 0,
        namespace: "default".to_string(),
    };
    let app = build_router(AppState::build(config).unwrap());

    let first = app
        .clone()
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "mock-model", "messages": [{"role": "user", "content": "first"}]}),
        ))
        .await
        .unwrap();
    let session_id = first
        .headers()
        .get("x-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let mut request = post(
        "/v1/chat/completions",
        json!({"model": "mock-model", "messages": [{"role": "user", "content": "second"}]}),
    );
    request
        .headers_mut()
        .insert("x-session-id", session_id.parse().unwrap());
    let second = app.oneshot(request).await.unwrap();
    let body = body_json(second).await;
    assert_eq!(body["choices"][0]["message"]["content"], "mock:n=3 last=second");
}
