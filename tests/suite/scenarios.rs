//! Whole-turn scenarios against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use toolrelay_engine::TurnContext;
use toolrelay_tools::{CallableTool, ChannelSink, ToolCtx, ToolError, ToolFut};
use toolrelay_types::{ChatTurn, ToolSpec};

use crate::common::{FakeToolService, RecordingSink, ScriptedChat, catalog, relay, turn};

#[tokio::test]
async fn selected_remote_tool_runs_once_and_yields_one_source() {
    let chat = ScriptedChat::choosing("Google.ListCalendars", json!({}));
    let service = FakeToolService::new();
    service.respond(
        "Google.ListCalendars",
        toolrelay_providers::ExecutionResponse::success(json!([{"id": "primary"}])),
    );
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("alice").with_sink(sink.clone());

    let out = relay(chat, service.clone())
        .run_turn(turn("what calendars do I have?"), &catalog(), &ctx)
        .await;

    assert_eq!(service.execution_count(), 1);
    assert_eq!(service.executions()[0].user_id, "alice");
    assert_eq!(out.sources.len(), 1);
    assert!(out.errors.is_empty());

    let source = &out.sources[0];
    assert!(!source.is_cited());
    assert_eq!(source.metadata[0].source, "Google.ListCalendars");
    let value: Value = serde_json::from_str(source.text().unwrap()).unwrap();
    assert_eq!(value, json!([{"id": "primary"}]));

    assert_eq!(
        sink.descriptions(),
        [
            "Selecting right tool",
            "Executing tool Google.ListCalendars",
            "Tool Google.ListCalendars executed with status success for 0 seconds",
            "All tools processed (1 calls)",
        ]
    );
}

#[tokio::test]
async fn unknown_tool_leaves_turn_unchanged() {
    let chat = ScriptedChat::choosing("Google.DeleteEverything", json!({}));
    let service = FakeToolService::new();
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("alice").with_sink(sink.clone());
    let original = turn("delete my calendar");

    let out = relay(chat, service.clone())
        .run_turn(original.clone(), &catalog(), &ctx)
        .await;

    assert_eq!(out.turn, original);
    assert!(out.sources.is_empty());
    assert!(out.errors.is_empty());
    assert_eq!(service.execution_count(), 0);
    assert!(service.authorizations.lock().unwrap().is_empty());
    assert_eq!(
        sink.descriptions(),
        ["Selecting right tool", "No response from tool"]
    );
}

#[tokio::test]
async fn unchanged_turn_keeps_fields_the_relay_does_not_read() {
    let raw = json!({
        "chat_id": "c1",
        "model": "gpt-4o",
        "stream": true,
        "messages": [
            {"role": "developer", "content": "Answer briefly."},
            {
                "role": "user",
                "content": [
                    {"type": "text", "text": "what is in this picture?"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAA"}}
                ]
            }
        ]
    });
    let original: ChatTurn = serde_json::from_value(raw.clone()).unwrap();
    let chat = ScriptedChat::choosing("Vision.Describe", json!({}));

    let out = relay(chat.clone(), FakeToolService::new())
        .run_turn(original, &catalog(), &TurnContext::new("alice"))
        .await;

    assert_eq!(serde_json::to_value(&out.turn).unwrap(), raw);
    let prompt = chat.requests.lock().unwrap()[0].messages[1].text().into_owned();
    assert!(prompt.ends_with("\nQuery: what is in this picture?"));
    assert!(prompt.contains("DEVELOPER: \"\"\"Answer briefly.\"\"\""));
}

#[tokio::test]
async fn sources_follow_the_selected_call_order() {
    let chat = ScriptedChat::new(
        json!({"tool_calls": [
            {"name": "Google.CreateEvent",
             "parameters": {"summary": "Sync", "start": {"dateTime": "2024-05-01T09:00:00Z"}}},
            {"name": "Google.ListCalendars", "parameters": {}},
            {"name": "list_tools", "parameters": {}}
        ]})
        .to_string(),
    );
    let service = FakeToolService::new();

    let out = relay(chat, service.clone())
        .run_turn(turn("plan my day"), &catalog(), &TurnContext::new("alice"))
        .await;

    let order: Vec<_> = out
        .sources
        .iter()
        .map(|record| record.metadata[0].source.as_str())
        .collect();
    assert_eq!(order, ["Google.CreateEvent", "Google.ListCalendars", "list_tools"]);
    let executed: Vec<_> = service
        .executions()
        .into_iter()
        .map(|execution| execution.tool_name)
        .collect();
    assert_eq!(executed, ["Google.CreateEvent", "Google.ListCalendars"]);
}

#[tokio::test]
async fn stalled_status_consumer_does_not_block_the_turn() {
    let chat = ScriptedChat::choosing("Google.ListCalendars", json!({}));
    let service = FakeToolService::new();
    let (tx, _rx) = mpsc::channel(1);
    let ctx = TurnContext::new("alice").with_sink(Arc::new(ChannelSink::new(tx)));

    let out = tokio::time::timeout(
        Duration::from_secs(3),
        relay(chat, service.clone()).run_turn(turn("calendars"), &catalog(), &ctx),
    )
    .await
    .expect("turn blocked on a full status channel");

    assert_eq!(service.execution_count(), 1);
    assert_eq!(out.sources.len(), 1);
}

#[tokio::test]
async fn create_event_gets_end_time_before_dispatch() {
    let chat = ScriptedChat::choosing(
        "Google.CreateEvent",
        json!({"summary": "Standup", "start": {"dateTime": "2024-05-01T10:00:00Z"}}),
    );
    let service = FakeToolService::new();

    let out = relay(chat, service.clone())
        .run_turn(turn("book a standup"), &catalog(), &TurnContext::new("alice"))
        .await;

    let executions = service.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(
        executions[0].input["end"],
        json!({"dateTime": "2024-05-01T11:00:00Z"})
    );
    assert_eq!(
        executions[0].input["start"],
        json!({"dateTime": "2024-05-01T10:00:00Z"})
    );
    assert_eq!(
        out.sources[0].source.name.as_deref(),
        Some("Google.CreateEvent")
    );
}

#[tokio::test]
async fn pending_authorization_halts_without_execution() {
    let chat = ScriptedChat::choosing("Google.ListCalendars", json!({}));
    let service = FakeToolService::new();
    service.require_consent("Google.ListCalendars", "https://auth.example/x");
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("alice").with_sink(sink.clone());

    let out = relay(chat, service.clone())
        .run_turn(turn("what calendars do I have?"), &catalog(), &ctx)
        .await;

    assert_eq!(service.execution_count(), 0);
    assert_eq!(out.sources.len(), 1);
    let rendered: Value = serde_json::from_str(out.sources[0].text().unwrap()).unwrap();
    assert_eq!(rendered["status"], "pending");
    assert!(rendered["result"].is_null());

    let auth = sink
        .events()
        .into_iter()
        .find(|event| event.auth_url.is_some())
        .unwrap();
    assert_eq!(auth.auth_url.as_deref(), Some("https://auth.example/x"));
    assert_eq!(auth.description, "Need to authorize tool Google.ListCalendars");
    assert!(auth.done);
}

struct Exploding;

impl CallableTool for Exploding {
    fn spec(&self) -> &ToolSpec {
        static SPEC: std::sync::OnceLock<ToolSpec> = std::sync::OnceLock::new();
        SPEC.get_or_init(|| ToolSpec::new("Flaky.Explode", "Always panics"))
    }

    fn invoke<'a>(&'a self, _args: Map<String, Value>, _ctx: &'a ToolCtx) -> ToolFut<'a> {
        panic!("kaboom")
    }
}

struct Refusing;

impl CallableTool for Refusing {
    fn spec(&self) -> &ToolSpec {
        static SPEC: std::sync::OnceLock<ToolSpec> = std::sync::OnceLock::new();
        SPEC.get_or_init(|| ToolSpec::new("Flaky.Refuse", "Always errors"))
    }

    fn invoke<'a>(&'a self, _args: Map<String, Value>, _ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async {
            Err(ToolError::ExecutionFailed {
                tool: "Flaky.Refuse".into(),
                message: "backend unavailable".into(),
            })
        })
    }
}

#[tokio::test]
async fn failing_call_does_not_stop_the_next_one() {
    let chat = ScriptedChat::new(
        json!({"tool_calls": [
            {"name": "Flaky.Explode", "parameters": {}},
            {"name": "Google.ListCalendars", "parameters": {}}
        ]})
        .to_string(),
    );
    let service = FakeToolService::new();
    let relay = relay(chat, service.clone());
    let mut table = relay.build_table(&catalog()).unwrap();
    table.register(Box::new(Exploding)).unwrap();

    let out = relay
        .run_turn_with_table(turn("calendars?"), &table, &TurnContext::new("alice"))
        .await;

    assert_eq!(service.execution_count(), 1);
    assert_eq!(out.sources.len(), 1);
    assert_eq!(out.sources[0].metadata[0].source, "Google.ListCalendars");
    assert_eq!(out.errors.len(), 1);
    assert_eq!(out.errors[0].tool_name, "Flaky.Explode");
    assert_eq!(out.errors[0].message, "Tool panicked: kaboom");
}

#[tokio::test]
async fn tool_error_is_captured_as_text() {
    let chat = ScriptedChat::new(
        json!({"tool_calls": [
            {"name": "Flaky.Refuse", "parameters": {}},
            {"name": "list_tools", "parameters": {}}
        ]})
        .to_string(),
    );
    let relay = relay(chat, FakeToolService::new());
    let mut table = relay.build_table(&catalog()).unwrap();
    table.register(Box::new(Refusing)).unwrap();
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("alice").with_sink(sink.clone());

    let out = relay.run_turn_with_table(turn("tools?"), &table, &ctx).await;

    assert_eq!(out.sources.len(), 1);
    assert_eq!(out.sources[0].metadata[0].source, "list_tools");
    assert_eq!(
        out.errors[0].message,
        "Tool execution failed: Flaky.Refuse: backend unavailable"
    );
    assert!(
        sink.descriptions()
            .contains(&"All tools processed (2 calls)".to_string())
    );
}
