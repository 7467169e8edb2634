// Durable workflow scenarios over the HTTP surface: webhook resume,
// exactly-once consumption, and status queries.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use flydesk::workflows::models::{StepDefinition, StepType, WorkflowStatus};

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition {
            step_type: StepType::ToolCall,
            description: "create vendor record".to_string(),
            input: None,
        },
        StepDefinition {
            step_type: StepType::WaitWebhook,
            description: "await approval".to_string(),
            input: None,
        },
        StepDefinition {
            step_type: StepType::Notify,
            description: "notify requester".to_string(),
            input: None,
        },
    ]
}

#[tokio::test]
async fn webhook_resumes_waiting_workflow_exactly_once() {
    let harness = common::harness().await;
    let router = common::router_for(&harness);

    let workflow = harness
        .state
        .workflow_engine
        .start("vendor_onboard", json!({}), "dev-user", None, &steps())
        .await
        .unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Pending);

    // The executor has run step 0 and parked the workflow on its webhook.
    harness
        .state
        .workflow_repo
        .save_checkpoint(&workflow.id, &json!({}), Some(1), None)
        .await
        .unwrap();
    harness
        .state
        .workflow_repo
        .update_status(&workflow.id, WorkflowStatus::Waiting, None)
        .await
        .unwrap();

    let registrations = harness
        .state
        .workflow_repo
        .webhooks_for_workflow(&workflow.id)
        .await
        .unwrap();
    assert_eq!(registrations.len(), 1);
    let token = registrations[0].webhook_token.clone();
    assert!(token.len() >= 64);

    let first = router
        .clone()
        .oneshot(post(&format!("/api/webhooks/{token}"), json!({"approved": true})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let resumed = harness
        .state
        .workflow_repo
        .get(&workflow.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resumed.status, WorkflowStatus::Running);
    assert_eq!(resumed.state["trigger_1"], json!({"approved": true}));

    // Replay with the same token is a 404.
    let second = router
        .clone()
        .oneshot(post(&format!("/api/webhooks/{token}"), json!({"approved": true})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_deliveries_resume_once() {
    let harness = common::harness().await;
    let router = common::router_for(&harness);

    let workflow = harness
        .state
        .workflow_engine
        .start("vendor_onboard", json!({}), "dev-user", None, &steps())
        .await
        .unwrap();
    harness
        .state
        .workflow_repo
        .save_checkpoint(&workflow.id, &json!({}), Some(1), None)
        .await
        .unwrap();
    harness
        .state
        .workflow_repo
        .update_status(&workflow.id, WorkflowStatus::Waiting, None)
        .await
        .unwrap();

    let token = harness
        .state
        .workflow_repo
        .webhooks_for_workflow(&workflow.id)
        .await
        .unwrap()[0]
        .webhook_token
        .clone();

    let uri = format!("/api/webhooks/{token}");
    let (a, b) = tokio::join!(
        router.clone().oneshot(post(&uri, json!({"n": 1}))),
        router.clone().oneshot(post(&uri, json!({"n": 2}))),
    );
    let statuses = [a.unwrap().status(), b.unwrap().status()];

    let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let not_found = statuses
        .iter()
        .filter(|s| **s == StatusCode::NOT_FOUND)
        .count();
    assert_eq!(ok, 1);
    assert_eq!(not_found, 1);
}

#[tokio::test]
async fn unknown_token_is_404() {
    let harness = common::harness().await;
    let router = common::router_for(&harness);

    let response = router
        .oneshot(post("/api/webhooks/not-a-real-token", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_endpoint_reports_progress() {
    let harness = common::harness().await;
    let router = common::router_for(&harness);

    let workflow = harness
        .state
        .workflow_engine
        .start("vendor_onboard", json!({}), "dev-user", None, &steps())
        .await
        .unwrap();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/workflows/{}/status", workflow.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let status: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(status["status"], "pending");
    assert_eq!(status["total_steps"], 3);
    assert_eq!(status["current_step"], 0);

    // Cancelling moves the workflow to a terminal status.
    let cancel = router
        .clone()
        .oneshot(post(&format!("/api/workflows/{}/cancel", workflow.id), json!({})))
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::OK);
    let loaded = harness
        .state
        .workflow_repo
        .get(&workflow.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, WorkflowStatus::Cancelled);
}
