use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use engine::{EngineConfig, MemoryStore, Workflow, WorkflowEngine, WorkflowStep, WorkflowStore};
use steps::mock::{MockAgentDirectory, MockHttpClient, MockNotificationChannel, MockRecordStore};
use steps::{Collaborators, StepRegistry, StepSettings};

use crate::{router, AppState};

fn setup() -> (Arc<MemoryStore>, Router) {
    let store = Arc::new(MemoryStore::new());
    let collaborators = Collaborators {
        agents: Arc::new(MockAgentDirectory::with_agent("agent-1")),
        records: Arc::new(MockRecordStore::new()),
        notifications: Arc::new(MockNotificationChannel::new()),
        http: Arc::new(MockHttpClient::responding(200, None)),
    };
    let registry = StepRegistry::builtin(collaborators, StepSettings::default());
    let dyn_store: Arc<dyn WorkflowStore> = store.clone();
    let engine = WorkflowEngine::new(dyn_store, registry, EngineConfig::default());
    (store, router(AppState::new(Arc::new(engine))))
}

async fn seed(store: &MemoryStore, trigger: &str, steps: &[(i32, &str, Value)]) -> Workflow {
    let workflow = Workflow::new("seeded", trigger);
    let steps: Vec<WorkflowStep> = steps
        .iter()
        .map(|(order, ty, config)| WorkflowStep::new(workflow.id, *order, *ty, config.clone()))
        .collect();
    store.create_workflow(&workflow, &steps).await.unwrap();
    workflow
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_is_ok() {
    let (_, app) = setup();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ---- events ----

#[tokio::test]
async fn event_dispatch_reports_each_run() {
    let (store, app) = setup();
    let workflow = seed(
        &store,
        "deal_won",
        &[(1, "condition", json!({ "field": "amount", "operator": "greater_than", "value": 10 }))],
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/events",
        Some(json!({ "event_type": "deal_won", "event_data": { "amount": 50 } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["event_type"], "deal_won");
    assert_eq!(body["workflows_triggered"], 1);
    let result = &body["results"][0];
    assert_eq!(result["workflow_id"], workflow.id.to_string());
    assert_eq!(result["workflow_name"], "seeded");
    assert_eq!(result["success"], true);
    assert_eq!(result["status"], "completed");
    assert!(result.get("error").is_none());
    assert!(result["execution_id"].is_string());
}

#[tokio::test]
async fn event_with_no_subscribers_triggers_nothing() {
    let (_, app) = setup();
    let event = json!({ "event_type": "noop" });
    let (status, body) = send(&app, "POST", "/api/v1/events", Some(event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflows_triggered"], 0);
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn blank_event_type_is_rejected() {
    let (_, app) = setup();
    let event = json!({ "event_type": " " });
    let (status, body) = send(&app, "POST", "/api/v1/events", Some(event)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_event_body_is_a_client_error() {
    let (_, app) = setup();
    let (status, body) = send(&app, "POST", "/api/v1/events", Some(json!({ "event": 1 }))).await;
    assert!(status.is_client_error());
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn unreachable_store_answers_service_unavailable() {
    let (store, app) = setup();
    store.fail_workflow_queries().await;

    let (status, body) =
        send(&app, "POST", "/api/v1/events", Some(json!({ "event_type": "deal_won" }))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

// ---- executions ----

async fn dispatch_one(app: &Router) -> Value {
    let (_, body) = send(
        app,
        "POST",
        "/api/v1/events",
        Some(json!({ "event_type": "refund_requested", "event_data": { "amount": 900 } })),
    )
    .await;
    body["results"][0].clone()
}

#[tokio::test]
async fn execution_record_is_readable_with_logs() {
    let (store, app) = setup();
    seed(&store, "refund_requested", &[(1, "wait", json!({ "delay_ms": 0 }))]).await;
    let result = dispatch_one(&app).await;

    let uri = format!("/api/v1/executions/{}", result["execution_id"].as_str().unwrap());
    let (status, body) = send(&app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["trigger_data"]["amount"], 900);
    assert!(body["logs"][0].as_str().unwrap().ends_with("Step 1 (wait): Waited 0ms"));
}

#[tokio::test]
async fn unknown_execution_is_not_found() {
    let (_, app) = setup();
    let uri = format!("/api/v1/executions/{}", Uuid::new_v4());
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn approval_checks_the_approver_and_the_state() {
    let (store, app) = setup();
    seed(&store, "refund_requested", &[(1, "approval", json!({ "approvers": ["lead"] }))]).await;
    let result = dispatch_one(&app).await;
    assert_eq!(result["status"], "waiting_approval");

    let uri = format!("/api/v1/executions/{}/approval", result["execution_id"].as_str().unwrap());

    let outsider = json!({ "approved": true, "approver": "intern" });
    let (status, _) = send(&app, "POST", &uri, Some(outsider)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(json!({ "approved": true, "approver": "lead", "comment": "fine" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let second = json!({ "approved": false, "approver": "lead" });
    let (status, body) = send(&app, "POST", &uri, Some(second)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn cancel_ends_a_suspended_run_and_refuses_a_finished_one() {
    let (store, app) = setup();
    seed(&store, "refund_requested", &[(1, "approval", json!({}))]).await;
    let result = dispatch_one(&app).await;
    let uri = format!("/api/v1/executions/{}/cancel", result["execution_id"].as_str().unwrap());

    let (status, body) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ---- workflows ----

#[tokio::test]
async fn workflow_authoring_round() {
    let (_, app) = setup();

    let (status, created) = send(
        &app,
        "POST",
        "/api/v1/workflows",
        Some(json!({
            "name": "Route urgent tickets",
            "trigger_type": "ticket_created",
            "steps": [
                {
                    "sort_order": 2,
                    "step_type": "function",
                    "step_config": { "function_name": "assign_to_least_busy_agent" }
                },
                {
                    "sort_order": 1,
                    "step_type": "condition",
                    "step_config": { "field": "priority", "operator": "equals", "value": "urgent" }
                }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["is_active"], true);
    assert_eq!(created["steps"][0]["sort_order"], 1);
    assert_eq!(created["steps"][1]["step_type"], "function");

    let uri = format!("/api/v1/workflows/{}", created["id"].as_str().unwrap());
    let (status, fetched) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Route urgent tickets");
    assert_eq!(fetched["steps"].as_array().unwrap().len(), 2);

    let (status, list) = send(&app, "GET", "/api/v1/workflows", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_workflows_are_unprocessable() {
    let (_, app) = setup();

    let cases = [
        json!({ "name": "dup", "trigger_type": "t", "steps": [
            { "sort_order": 1, "step_type": "wait" },
            { "sort_order": 1, "step_type": "wait" }
        ]}),
        json!({ "name": "unknown", "trigger_type": "t", "steps": [
            { "sort_order": 1, "step_type": "teleport" }
        ]}),
        json!({ "name": "bad config", "trigger_type": "t", "steps": [
            { "sort_order": 1, "step_type": "webhook", "step_config": { "method": "POST" } }
        ]}),
        json!({ "name": "", "trigger_type": "t" }),
    ];

    for case in cases {
        let (status, body) = send(&app, "POST", "/api/v1/workflows", Some(case.clone())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{case}");
        assert_eq!(body["success"], false);
    }
}
