// End-to-end agent turns against the scripted provider: streaming, routing,
// tool calls with confirmation, widget parsing, and failure handling.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use flydesk::agent::events::RecordingEventSink;
use flydesk::agent::router::{ComplexityTier, RoutingConfig};
use flydesk::agent::TurnRequest;
use flydesk::auth::UserSession;
use flydesk::catalog::{
    AuthConfig, AuthType, ExternalSystem, HttpMethod, RiskLevel, ServiceEndpoint, SystemStatus,
};
use flydesk::conversation::MessageRole;
use flydesk::llm::testing::ScriptedReply;
use flydesk::llm::{FunctionCall, ToolCall};

async fn new_conversation(harness: &common::Harness, user: &UserSession) -> String {
    harness
        .state
        .conversations
        .create(&user.user_id, Some("test"))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn simple_chat_streams_tokens_then_done() {
    let harness = common::harness().await;
    let user = UserSession::dev_user();
    let conversation_id = new_conversation(&harness, &user).await;

    harness.provider.push(ScriptedReply::Tokens(vec![
        "Hi".to_string(),
        "!".to_string(),
    ]));

    let sink = RecordingEventSink::new();
    let outcome = harness
        .state
        .runner
        .run_turn(TurnRequest::new(&conversation_id, "Hello"), &user, &sink)
        .await
        .unwrap();

    let event_types = sink.event_types();
    assert_eq!(event_types, vec!["token", "token", "done"]);
    assert_eq!(outcome.assistant_text, "Hi!");

    // Routing is unconfigured: the only provider call is the stream itself.
    assert_eq!(harness.provider.request_count(), 1);

    let messages = harness
        .state
        .conversations
        .list_messages(&conversation_id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].content, "Hi!");
}

#[tokio::test]
async fn routed_turn_emits_routing_event_first() {
    let harness = common::harness().await;
    let user = UserSession::dev_user();
    let conversation_id = new_conversation(&harness, &user).await;

    let mut tier_mappings = BTreeMap::new();
    tier_mappings.insert("fast".to_string(), "m-fast".to_string());
    tier_mappings.insert("balanced".to_string(), "m-bal".to_string());
    tier_mappings.insert("powerful".to_string(), "m-big".to_string());
    harness
        .state
        .routing_config
        .update_config(&RoutingConfig {
            enabled: true,
            classifier_model: None,
            default_tier: ComplexityTier::Balanced,
            tier_mappings,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    harness
        .provider
        .push_text(r#"{"tier": "fast", "confidence": 0.9, "reasoning": "greeting"}"#);
    harness.provider.push(ScriptedReply::Tokens(vec!["Hey".to_string()]));

    let sink = RecordingEventSink::new();
    harness
        .state
        .runner
        .run_turn(TurnRequest::new(&conversation_id, "Hello"), &user, &sink)
        .await
        .unwrap();

    let events = sink.events();
    assert_eq!(events[0].0, "routing");
    assert_eq!(events[0].1["tier"], "fast");
    assert_eq!(events[0].1["model"], "m-fast");

    // The streamed completion ran on the routed model.
    let requests = harness.provider.requests();
    assert_eq!(requests.last().unwrap().model, "m-fast");
}

#[tokio::test]
async fn destructive_tool_requires_confirmation() {
    let harness = common::harness().await;
    let user = UserSession::dev_user();
    let conversation_id = new_conversation(&harness, &user).await;

    // Local endpoint standing in for the external system.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 16\r\n\r\n{\"deleted\":true}",
                )
                .await;
        }
    });

    harness
        .state
        .catalog
        .upsert_system(&ExternalSystem {
            id: "crm".to_string(),
            name: "CRM".to_string(),
            description: String::new(),
            base_url: format!("http://{addr}"),
            auth_config: AuthConfig {
                auth_type: AuthType::None,
                credential_id: String::new(),
                token_url: None,
                scopes: None,
                auth_headers: None,
            },
            health_check_path: None,
            tags: Vec::new(),
            status: SystemStatus::Active,
            metadata: serde_json::Value::Null,
        })
        .await
        .unwrap();
    harness
        .state
        .catalog
        .upsert_endpoint(&ServiceEndpoint {
            id: "ep-delete".to_string(),
            system_id: "crm".to_string(),
            name: "delete_customer".to_string(),
            description: "Delete a customer record".to_string(),
            method: HttpMethod::DELETE,
            path: "/customers/{id}".to_string(),
            path_params: None,
            query_params: None,
            request_body: None,
            when_to_use: "only on explicit request".to_string(),
            examples: Vec::new(),
            risk_level: RiskLevel::Destructive,
            required_permissions: Vec::new(),
            timeout_seconds: 10.0,
            enabled: true,
            tags: Vec::new(),
        })
        .await
        .unwrap();

    harness.provider.push(ScriptedReply::ToolCalls(vec![ToolCall {
        id: "call-1".to_string(),
        function: FunctionCall {
            name: "delete_customer".to_string(),
            arguments: r#"{"path": {"id": "c7"}}"#.to_string(),
        },
    }]));
    harness
        .provider
        .push(ScriptedReply::Tokens(vec!["Customer removed.".to_string()]));

    let sink = Arc::new(RecordingEventSink::new());
    let runner = harness.state.runner.clone();
    let sink_for_turn = sink.clone();
    let user_for_turn = user.clone();
    let conversation = conversation_id.clone();
    let turn = tokio::spawn(async move {
        runner
            .run_turn(
                TurnRequest::new(&conversation, "delete customer c7"),
                &user_for_turn,
                &*sink_for_turn,
            )
            .await
    });

    // Wait for the confirmation event, then approve it.
    let widget_id = loop {
        if let Some((_, data)) = sink.events().iter().find(|(t, _)| t == "confirmation") {
            break data["widget_id"].as_str().unwrap().to_string();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert!(harness.state.confirmations.resolve(&widget_id, true));

    let outcome = turn.await.unwrap().unwrap();
    assert_eq!(outcome.assistant_text, "Customer removed.");

    let event_types = sink.event_types();
    let confirmation_pos = event_types.iter().position(|t| t == "confirmation").unwrap();
    let tool_end_pos = event_types.iter().position(|t| t == "tool_end").unwrap();
    assert!(confirmation_pos < tool_end_pos);
    assert_eq!(event_types.last().unwrap(), "done");

    let (_, tool_end) = sink
        .events()
        .into_iter()
        .find(|(t, _)| t == "tool_end")
        .unwrap();
    assert_eq!(tool_end["result"]["body"]["deleted"], true);
}

#[tokio::test]
async fn declined_confirmation_skips_the_call() {
    let harness = common::harness().await;
    let user = UserSession::dev_user();
    let conversation_id = new_conversation(&harness, &user).await;

    harness
        .state
        .catalog
        .upsert_system(&ExternalSystem {
            id: "crm".to_string(),
            name: "CRM".to_string(),
            description: String::new(),
            base_url: "http://127.0.0.1:9".to_string(),
            auth_config: AuthConfig {
                auth_type: AuthType::None,
                credential_id: String::new(),
                token_url: None,
                scopes: None,
                auth_headers: None,
            },
            health_check_path: None,
            tags: Vec::new(),
            status: SystemStatus::Active,
            metadata: serde_json::Value::Null,
        })
        .await
        .unwrap();
    harness
        .state
        .catalog
        .upsert_endpoint(&ServiceEndpoint {
            id: "ep-wipe".to_string(),
            system_id: "crm".to_string(),
            name: "wipe_account".to_string(),
            description: "Wipe an account".to_string(),
            method: HttpMethod::DELETE,
            path: "/accounts/{id}".to_string(),
            path_params: None,
            query_params: None,
            request_body: None,
            when_to_use: String::new(),
            examples: Vec::new(),
            risk_level: RiskLevel::HighWrite,
            required_permissions: Vec::new(),
            timeout_seconds: 5.0,
            enabled: true,
            tags: Vec::new(),
        })
        .await
        .unwrap();

    harness.provider.push(ScriptedReply::ToolCalls(vec![ToolCall {
        id: "call-1".to_string(),
        function: FunctionCall {
            name: "wipe_account".to_string(),
            arguments: r#"{"path": {"id": "a1"}}"#.to_string(),
        },
    }]));
    harness
        .provider
        .push(ScriptedReply::Tokens(vec!["Understood, leaving it.".to_string()]));

    let sink = Arc::new(RecordingEventSink::new());
    let runner = harness.state.runner.clone();
    let sink_for_turn = sink.clone();
    let user_for_turn = user.clone();
    let conversation = conversation_id.clone();
    let turn = tokio::spawn(async move {
        runner
            .run_turn(
                TurnRequest::new(&conversation, "wipe account a1"),
                &user_for_turn,
                &*sink_for_turn,
            )
            .await
    });

    let widget_id = loop {
        if let Some((_, data)) = sink.events().iter().find(|(t, _)| t == "confirmation") {
            break data["widget_id"].as_str().unwrap().to_string();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    harness.state.confirmations.resolve(&widget_id, false);

    turn.await.unwrap().unwrap();

    // The decline is fed back as a structured tool failure; no HTTP call was
    // attempted against the dead port, so there is no transport error.
    let (_, tool_end) = sink
        .events()
        .into_iter()
        .find(|(t, _)| t == "tool_end")
        .unwrap();
    assert_eq!(tool_end["result"]["success"], false);
}

#[tokio::test]
async fn widget_directives_are_parsed_and_stripped() {
    let harness = common::harness().await;
    let user = UserSession::dev_user();
    let conversation_id = new_conversation(&harness, &user).await;

    let reply = "Here is the chart:\n:::widget{type=chart panel=true}\n{\"series\": [3, 1]}\n:::\nAnything else?";
    harness.provider.push_text(reply);

    let sink = RecordingEventSink::new();
    let outcome = harness
        .state
        .runner
        .run_turn(TurnRequest::new(&conversation_id, "chart please"), &user, &sink)
        .await
        .unwrap();

    assert_eq!(outcome.widget_count, 1);
    let (_, widget) = sink
        .events()
        .into_iter()
        .find(|(t, _)| t == "widget")
        .unwrap();
    assert_eq!(widget["type"], "chart");
    assert_eq!(widget["props"]["series"][0], 3);

    let messages = harness
        .state
        .conversations
        .list_messages(&conversation_id)
        .await
        .unwrap();
    let assistant = messages.last().unwrap();
    assert_eq!(assistant.content, "Here is the chart:\n\nAnything else?");
    assert!(assistant.metadata["raw_content"]
        .as_str()
        .unwrap()
        .contains(":::widget"));
}

#[tokio::test]
async fn builtin_tool_result_feeds_back_to_the_model() {
    let harness = common::harness().await;
    let user = UserSession::dev_user();
    let conversation_id = new_conversation(&harness, &user).await;

    harness.provider.push(ScriptedReply::ToolCalls(vec![ToolCall {
        id: "call-1".to_string(),
        function: FunctionCall {
            name: "save_memory".to_string(),
            arguments: r#"{"content": "works remote on Fridays"}"#.to_string(),
        },
    }]));
    harness.provider.push_text("Noted!");

    let sink = RecordingEventSink::new();
    harness
        .state
        .runner
        .run_turn(
            TurnRequest::new(&conversation_id, "remember I work remote on Fridays"),
            &user,
            &sink,
        )
        .await
        .unwrap();

    // The memory was stored through the built-in tool.
    let memories = harness
        .state
        .memories
        .list_for_user(&user.user_id, None)
        .await
        .unwrap();
    assert_eq!(memories.len(), 1);
    assert!(memories[0].content.contains("Fridays"));

    // The second model request carries the tool result message.
    let requests = harness.provider.requests();
    let followup = requests.last().unwrap();
    assert!(followup
        .messages
        .iter()
        .any(|m| m.role == "tool" && m.content.contains("memory_id")));
}

#[tokio::test]
async fn provider_error_aborts_without_assistant_message() {
    let harness = common::harness().await;
    let user = UserSession::dev_user();
    let conversation_id = new_conversation(&harness, &user).await;

    harness
        .provider
        .push(ScriptedReply::Error("connection reset".to_string()));

    let sink = RecordingEventSink::new();
    let result = harness
        .state
        .runner
        .run_turn(TurnRequest::new(&conversation_id, "Hello"), &user, &sink)
        .await;
    assert!(result.is_err());

    let event_types = sink.event_types();
    assert!(event_types.contains(&"error".to_string()));
    assert_eq!(event_types.last().unwrap(), "done");

    // The user message persisted, the assistant message did not.
    let messages = harness
        .state
        .conversations
        .list_messages(&conversation_id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::User);
}

#[tokio::test]
async fn tool_cap_terminates_the_turn() {
    let harness = common::harness().await;
    let user = UserSession::dev_user();
    let conversation_id = new_conversation(&harness, &user).await;

    // The harness caps at 3 tools per turn; script 4 rounds of tool calls.
    for i in 0..4 {
        harness.provider.push(ScriptedReply::ToolCalls(vec![ToolCall {
            id: format!("call-{i}"),
            function: FunctionCall {
                name: "platform_status".to_string(),
                arguments: "{}".to_string(),
            },
        }]));
    }

    let sink = RecordingEventSink::new();
    let result = harness
        .state
        .runner
        .run_turn(TurnRequest::new(&conversation_id, "loop forever"), &user, &sink)
        .await;
    assert!(result.is_err());

    let (_, error) = sink
        .events()
        .into_iter()
        .find(|(t, _)| t == "error")
        .unwrap();
    assert_eq!(error["kind"], "limit_exceeded");
    assert_eq!(sink.event_types().last().unwrap(), "done");
}

#[tokio::test]
async fn scoped_user_cannot_see_other_systems_tools() {
    let harness = common::harness().await;

    for system_id in ["sys1", "sys2"] {
        harness
            .state
            .catalog
            .upsert_system(&ExternalSystem {
                id: system_id.to_string(),
                name: system_id.to_string(),
                description: String::new(),
                base_url: "http://example.invalid".to_string(),
                auth_config: AuthConfig {
                    auth_type: AuthType::None,
                    credential_id: String::new(),
                    token_url: None,
                    scopes: None,
                    auth_headers: None,
                },
                health_check_path: None,
                tags: Vec::new(),
                status: SystemStatus::Active,
                metadata: serde_json::Value::Null,
            })
            .await
            .unwrap();
        harness
            .state
            .catalog
            .upsert_endpoint(&ServiceEndpoint {
                id: format!("ep-{system_id}"),
                system_id: system_id.to_string(),
                name: format!("lookup_{system_id}"),
                description: "lookup".to_string(),
                method: HttpMethod::GET,
                path: "/x".to_string(),
                path_params: None,
                query_params: None,
                request_body: None,
                when_to_use: String::new(),
                examples: Vec::new(),
                risk_level: RiskLevel::Read,
                required_permissions: vec!["crm:read".to_string()],
                timeout_seconds: 5.0,
                enabled: true,
                tags: Vec::new(),
            })
            .await
            .unwrap();
    }

    let mut scoped = UserSession::dev_user();
    scoped.permissions = vec!["crm:read".to_string(), "chat:send".to_string()];
    scoped.access_scopes.systems = vec!["sys1".to_string()];
    let conversation_id = new_conversation(&harness, &scoped).await;

    harness.provider.push_text("ok");
    let sink = RecordingEventSink::new();
    harness
        .state
        .runner
        .run_turn(TurnRequest::new(&conversation_id, "hi"), &scoped, &sink)
        .await
        .unwrap();

    let request = harness.provider.requests().pop().unwrap();
    let tool_names: Vec<String> = request.tools.iter().map(|t| t.name.clone()).collect();
    assert!(tool_names.contains(&"lookup_sys1".to_string()));
    assert!(!tool_names.contains(&"lookup_sys2".to_string()));
}
