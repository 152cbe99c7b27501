//! A full turn over HTTP, with wiremock standing in for both services.

use serde_json::{Value, json};
use toolrelay_config::RelayConfig;
use toolrelay_engine::{ToolRelay, TurnContext};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{RecordingSink, catalog, turn};

/// Writes a config file pointing both services at `server` and loads it.
fn config_for(server: &MockServer) -> RelayConfig {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let content = format!(
        r#"
        [chat]
        base_url = "{uri}/v1"
        api_key = "chat-key"
        task_model = "selector-mini"

        [tools]
        base_url = "{uri}"
        api_key = "tools-key"
        timeout_secs = 5
        "#,
        uri = server.uri()
    );
    std::fs::write(&path, content).unwrap();
    RelayConfig::load_from(&path).unwrap()
}

async fn mount_selector_reply(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer chat-key"))
        .and(body_partial_json(json!({
            "model": "selector-mini",
            "stream": false,
            "metadata": {"task": "function_calling"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn turn_runs_against_http_services() {
    let server = MockServer::start().await;
    mount_selector_reply(
        &server,
        "Here you go: {\"name\": \"Google.ListCalendars\", \"parameters\": {}}",
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/authorize"))
        .and(header("authorization", "Bearer tools-key"))
        .and(body_partial_json(json!({
            "tool_name": "Google.ListCalendars",
            "user_id": "carol"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "completed"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/execute"))
        .and(body_partial_json(json!({
            "tool_name": "Google.ListCalendars",
            "input": {},
            "user_id": "carol"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "success": true,
            "output": {"value": {"calendars": ["primary", "work"]}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let relay = ToolRelay::from_config(&config_for(&server)).unwrap();
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("carol").with_sink(sink.clone());

    let out = relay
        .run_turn(turn("which calendars?"), &catalog(), &ctx)
        .await;

    assert_eq!(out.sources.len(), 1);
    let value: Value = serde_json::from_str(out.sources[0].text().unwrap()).unwrap();
    assert_eq!(value, json!({"calendars": ["primary", "work"]}));
    assert_eq!(sink.events().last().unwrap().description, "All tools processed (1 calls)");
}

#[tokio::test]
async fn pending_consent_over_http_skips_execute() {
    let server = MockServer::start().await;
    mount_selector_reply(&server, r#"{"name": "Google.ListCalendars", "parameters": {}}"#).await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "pending",
            "url": "https://auth.example/x"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/execute"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let relay = ToolRelay::from_config(&config_for(&server)).unwrap();
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("carol").with_sink(sink.clone());

    let out = relay.run_turn(turn("calendars"), &catalog(), &ctx).await;

    let rendered: Value = serde_json::from_str(out.sources[0].text().unwrap()).unwrap();
    assert_eq!(rendered["status"], "pending");
    assert!(
        sink.events()
            .iter()
            .any(|event| event.auth_url.as_deref() == Some("https://auth.example/x"))
    );
}

#[tokio::test]
async fn execute_failure_becomes_error_source() {
    let server = MockServer::start().await;
    mount_selector_reply(&server, r#"{"name": "Google.ListCalendars", "parameters": {}}"#).await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "completed"})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/execute"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
        .expect(1)
        .mount(&server)
        .await;

    let relay = ToolRelay::from_config(&config_for(&server)).unwrap();
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("carol").with_sink(sink.clone());

    let out = relay.run_turn(turn("calendars"), &catalog(), &ctx).await;

    assert!(out.errors.is_empty());
    let rendered: Value = serde_json::from_str(out.sources[0].text().unwrap()).unwrap();
    assert_eq!(rendered["status"], "error");
    assert!(rendered["description"].as_str().unwrap().contains("bad input"));
    assert!(
        sink.descriptions()
            .contains(&"Error executing tool Google.ListCalendars".to_string())
    );
}

#[tokio::test]
async fn selector_http_failure_leaves_turn_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let relay = ToolRelay::from_config(&config_for(&server)).unwrap();
    let original = turn("calendars");
    let out = relay
        .run_turn(original.clone(), &catalog(), &TurnContext::new("carol"))
        .await;

    assert_eq!(out.turn, original);
    assert!(out.sources.is_empty());
}

#[tokio::test]
async fn stalled_selector_is_cut_off_by_chat_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_secs(10))
                .set_body_json(json!({"choices": [{"message": {"content": "{}"}}]})),
        )
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.chat.timeout_secs = 1;
    let relay = ToolRelay::from_config(&config).unwrap();
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("carol").with_sink(sink.clone());
    let original = turn("calendars");

    let out = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        relay.run_turn(original.clone(), &catalog(), &ctx),
    )
    .await
    .expect("selector call was not bounded");

    assert_eq!(out.turn, original);
    assert_eq!(
        sink.descriptions(),
        ["Selecting right tool", "No response from tool"]
    );
}
