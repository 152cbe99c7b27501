//! Invariants that hold for any turn.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use toolrelay_engine::TurnContext;
use toolrelay_tools::ChannelCaller;
use toolrelay_types::{ToolSpec, function_specs_json, parse_function_specs};

use crate::common::{FakeToolService, RecordingSink, ScriptedChat, catalog, relay, turn};

#[tokio::test]
async fn pending_consent_never_reaches_execution() {
    for tool in ["Google.ListCalendars", "Google.CreateEvent", "Docs.ExtractText"] {
        let chat = ScriptedChat::choosing(
            tool,
            json!({
                "summary": "x",
                "start": {"dateTime": "2024-05-01T10:00:00Z"},
                "url": "https://docs.example/a.pdf"
            }),
        );
        let service = FakeToolService::new();
        service.require_consent(tool, "https://auth.example/consent");

        let out = relay(chat, service.clone())
            .run_turn(turn("go"), &catalog(), &TurnContext::new("bob"))
            .await;

        assert_eq!(service.execution_count(), 0, "{tool} was executed");
        let rendered: Value = serde_json::from_str(out.sources[0].text().unwrap()).unwrap();
        assert_eq!(rendered["status"], "pending", "{tool}");
    }
}

#[tokio::test]
async fn consent_is_checked_on_every_call() {
    let chat = ScriptedChat::new(
        json!({"tool_calls": [
            {"name": "Google.ListCalendars", "parameters": {}},
            {"name": "Google.ListCalendars", "parameters": {}}
        ]})
        .to_string(),
    );
    let service = FakeToolService::new();

    relay(chat, service.clone())
        .run_turn(turn("twice"), &catalog(), &TurnContext::new("bob"))
        .await;

    assert_eq!(service.authorizations.lock().unwrap().len(), 2);
    assert_eq!(service.execution_count(), 2);
}

#[tokio::test]
async fn undeclared_parameters_never_reach_execution() {
    let chat = ScriptedChat::choosing(
        "Google.ListCalendars",
        json!({"max_results": 3, "api_key": "sk-stolen", "nested": {"a": 1}}),
    );
    let service = FakeToolService::new();

    relay(chat, service.clone())
        .run_turn(turn("calendars"), &catalog(), &TurnContext::new("bob"))
        .await;

    let input = &service.executions()[0].input;
    assert_eq!(Value::Object(input.clone()), json!({"max_results": 3}));
}

#[tokio::test]
async fn missing_required_parameter_skips_remote_calls() {
    let chat = ScriptedChat::choosing("Google.CreateEvent", json!({"summary": "Lunch"}));
    let service = FakeToolService::new();

    let out = relay(chat, service.clone())
        .run_turn(turn("lunch"), &catalog(), &TurnContext::new("bob"))
        .await;

    assert_eq!(service.execution_count(), 0);
    assert!(service.authorizations.lock().unwrap().is_empty());
    let rendered: Value = serde_json::from_str(out.sources[0].text().unwrap()).unwrap();
    assert_eq!(rendered["status"], "error");
    assert!(
        rendered["description"]
            .as_str()
            .unwrap()
            .contains("missing required parameters: start")
    );
}

#[test]
fn catalog_adaptation_is_repeatable() {
    let relay = relay(ScriptedChat::new("{}"), FakeToolService::new());
    let first = relay.build_table(&catalog()).unwrap();
    let second = relay.build_table(&catalog()).unwrap();

    let first: Vec<ToolSpec> = first.specs().cloned().collect();
    let second: Vec<ToolSpec> = second.specs().cloned().collect();
    assert_eq!(first, second);
    assert_eq!(first.last().map(|spec| spec.name.as_str()), Some("list_tools"));
}

#[test]
fn prompt_function_specs_round_trip() {
    let relay = relay(ScriptedChat::new("{}"), FakeToolService::new());
    let table = relay.build_table(&catalog()).unwrap();

    let parsed = parse_function_specs(&function_specs_json(table.specs())).unwrap();
    let names: Vec<_> = parsed.iter().map(|spec| spec.name.as_str()).collect();
    assert_eq!(names, table.names().collect::<Vec<_>>());
    for (back, original) in parsed.iter().zip(table.specs()) {
        assert_eq!(back.required_set(), original.required_set());
    }
}

#[tokio::test]
async fn selector_sees_every_tool_and_recent_history() {
    let chat = ScriptedChat::new(r#"{"tool_calls": []}"#);

    relay(chat.clone(), FakeToolService::new())
        .run_turn(turn("what is on today?"), &catalog(), &TurnContext::new("bob"))
        .await;

    let requests = chat.requests.lock().unwrap();
    let request = &requests[0];
    assert_eq!(request.metadata, json!({"task": "function_calling"}));
    let system = request.messages[0].text();
    for name in [
        "Google.ListCalendars",
        "Google.CreateEvent",
        "Docs.ExtractText",
        "browser.open",
        "list_tools",
    ] {
        assert!(system.contains(name), "{name} missing from prompt");
    }
    assert_eq!(
        request.messages[1].text(),
        "Query: History:\nUSER: \"\"\"what is on today?\"\"\"\n\
         SYSTEM: \"\"\"You are a helpful assistant.\"\"\"\nQuery: what is on today?"
    );
}

#[tokio::test]
async fn file_handler_output_supersedes_attached_files() {
    let chat = ScriptedChat::choosing("Docs.ExtractText", json!({"url": "https://docs.example/a.pdf"}));
    let service = FakeToolService::new();
    service.respond(
        "Docs.ExtractText",
        toolrelay_providers::ExecutionResponse::success(json!([
            "Quarterly report",
            "data:application/pdf;base64,JVBERi0x"
        ])),
    );
    let mut conversation = turn("summarize the attachment");
    conversation.metadata_mut().files = Some(vec![json!({"id": "file-1"})]);

    let out = relay(chat, service)
        .run_turn(conversation, &catalog(), &TurnContext::new("bob"))
        .await;

    assert!(out.turn.attached_files().is_none());
    assert_eq!(
        out.sources[0].document,
        [
            "[\n  \"Quarterly report\"\n]",
            "data:application/pdf;base64,JVBERi0x"
        ]
    );
}

#[tokio::test]
async fn attached_files_survive_other_tools() {
    let chat = ScriptedChat::choosing("Google.ListCalendars", json!({}));
    let mut conversation = turn("calendars");
    conversation.metadata_mut().files = Some(vec![json!({"id": "file-1"})]);

    let out = relay(chat, FakeToolService::new())
        .run_turn(conversation, &catalog(), &TurnContext::new("bob"))
        .await;

    assert_eq!(out.turn.attached_files(), Some(&[json!({"id": "file-1"})][..]));
}

#[tokio::test]
async fn direct_tools_dispatch_through_caller_without_consent() {
    let chat = ScriptedChat::choosing(
        "browser.open",
        json!({"url": "https://example.com", "tab": 3}),
    );
    let service = FakeToolService::new();
    let (tx, mut rx) = mpsc::channel(1);
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("bob")
        .with_sink(sink.clone())
        .with_caller(Arc::new(ChannelCaller::new(tx)));
    let mut conversation = turn("open example.com");
    conversation.metadata_mut().session_id = Some("sess-42".into());

    let responder = tokio::spawn(async move {
        let request = rx.recv().await.unwrap();
        let wire = request.event.to_wire();
        request.reply.send(Ok(json!("page opened"))).unwrap();
        wire
    });

    let out = relay(chat, service.clone())
        .run_turn(conversation, &catalog(), &ctx)
        .await;
    let wire = responder.await.unwrap();

    assert_eq!(wire["type"], "execute:tool");
    assert_eq!(wire["data"]["name"], "browser.open");
    assert_eq!(wire["data"]["params"], json!({"url": "https://example.com"}));
    assert_eq!(wire["data"]["server"], json!({"url": "http://mcp.local"}));
    assert_eq!(wire["data"]["session_id"], "sess-42");

    assert!(service.authorizations.lock().unwrap().is_empty());
    assert_eq!(service.execution_count(), 0);
    assert_eq!(
        out.sources[0].source.name.as_deref(),
        Some("TOOL:browser/browser.open")
    );
    assert_eq!(out.sources[0].text(), Some("page opened"));
}

#[tokio::test]
async fn direct_tool_without_caller_is_a_call_error() {
    let chat = ScriptedChat::choosing("browser.open", json!({"url": "https://example.com"}));

    let out = relay(chat, FakeToolService::new())
        .run_turn(turn("open it"), &catalog(), &TurnContext::new("bob"))
        .await;

    assert!(out.sources.is_empty());
    assert_eq!(out.errors[0].tool_name, "browser.open");
    assert!(out.errors[0].message.contains("no event-call channel attached"));
}

#[tokio::test]
async fn list_tools_reports_whole_catalog() {
    let chat = ScriptedChat::choosing("list_tools", json!({}));
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("bob").with_sink(sink.clone());

    let out = relay(chat, FakeToolService::new())
        .run_turn(turn("what can you do?"), &catalog(), &ctx)
        .await;

    let listed: Value = serde_json::from_str(out.sources[0].text().unwrap()).unwrap();
    let names: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        [
            "Google.ListCalendars",
            "Google.CreateEvent",
            "Docs.ExtractText",
            "browser.open"
        ]
    );
    assert!(sink.descriptions().contains(&"List of all tools".to_string()));
}
