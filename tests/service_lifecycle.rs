use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use innocore::agents::{Agent, AgentController};
use innocore::api::{create_router, AppState};
use innocore::health::HealthAggregator;
use innocore::lifecycle::{HaltOutcome, Lifecycle, LifecycleSettings};
use innocore::subsystems::{Database, VectorStore};
use innocore::{Config, SubsystemKind, SubsystemState, Task};

struct SummaryAgent;

#[async_trait]
impl Agent for SummaryAgent {
    fn name(&self) -> &str {
        "writer"
    }

    fn tools(&self) -> Vec<String> {
        vec!["outline".to_string()]
    }

    async fn execute(&self, task: &Task) -> Result<Value> {
        Ok(json!({ "summary": task.payload["title"] }))
    }
}

fn settings() -> LifecycleSettings {
    LifecycleSettings {
        startup_step_timeout: Duration::from_secs(2),
        teardown_step_timeout: Duration::from_secs(1),
        shutdown_deadline: Duration::from_secs(5),
        halt_grace: Duration::from_secs(1),
    }
}

fn service(controller: &Arc<AgentController>) -> Lifecycle {
    Lifecycle::new(
        settings(),
        Arc::new(Database::new(None)),
        Arc::new(VectorStore::new(None, 1536)),
        controller.clone(),
    )
}

fn app(lifecycle: &Lifecycle) -> Router {
    let state = AppState {
        health: Arc::new(HealthAggregator::new(
            lifecycle.agent_pool(),
            Duration::from_secs(1),
        )),
        config: Arc::new(Config::default()),
    };
    create_router(state, Router::new())
}

async fn health(app: Router) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_service_runs_without_storage() {
    let controller = Arc::new(AgentController::new(3));
    controller.register(Arc::new(SummaryAgent)).unwrap();
    let lifecycle = service(&controller);

    let report = lifecycle.start().await.unwrap();
    assert!(report.state(SubsystemKind::Persistence).is_degraded());
    assert!(report.state(SubsystemKind::VectorIndex).is_degraded());
    assert_eq!(report.state(SubsystemKind::AgentPool), SubsystemState::Ready);
    assert!(report.supervisor_launched);

    for title in ["Attention", "Transformers"] {
        controller
            .submit("writer", json!({ "title": title }))
            .unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (status, json) = health(app(&lifecycle)).await;
        assert_eq!(status, StatusCode::OK);
        if json["stats"]["completed_tasks"] == 2 {
            assert_eq!(json["status"], "healthy");
            assert_eq!(json["stats"]["max_concurrent"], 3);
            assert_eq!(json["agents"]["writer"]["state"], "idle");
            assert_eq!(json["agents"]["writer"]["history_count"], 2);
            assert_eq!(json["agents"]["writer"]["tools_count"], 1);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "tasks never completed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let shutdown = lifecycle.stop().await;
    assert_eq!(shutdown.supervisor, Some(HaltOutcome::Stopped));
    assert_eq!(shutdown.closed.len(), 3);
    assert!(shutdown.failures.is_empty());
    assert!(!controller.is_initialized());
}

#[tokio::test]
async fn test_degraded_pool_still_serves_health() {
    let controller = Arc::new(AgentController::new(0));
    controller.register(Arc::new(SummaryAgent)).unwrap();
    let lifecycle = service(&controller);

    let report = lifecycle.start().await.unwrap();
    assert!(report.state(SubsystemKind::AgentPool).is_degraded());
    assert!(!report.supervisor_launched);

    let (status, json) = health(app(&lifecycle)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["agents"], json!({}));

    let shutdown = lifecycle.stop().await;
    assert_eq!(shutdown.supervisor, Some(HaltOutcome::NotLaunched));
    assert_eq!(shutdown.closed.len(), 3);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let controller = Arc::new(AgentController::new(1));
    let lifecycle = service(&controller);
    lifecycle.start().await.unwrap();

    let first = lifecycle.stop().await;
    let second = lifecycle.stop().await;

    assert_eq!(first.closed.len(), 3);
    assert!(second.closed.is_empty());
    assert!(second.failures.is_empty());
}
