// Common test utilities that are shared across integration tests
#![allow(dead_code)]

use std::sync::Once;

use gatehouse::shared::{DomainEvent, UserView};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

pub fn task_event(behavior: &str, data: Value) -> DomainEvent {
    DomainEvent::new("Task", "42", data.as_object().cloned().unwrap_or_default())
        .with_behavior(behavior)
        .with_user(UserView::new("u1", "ada@example.com").with_name("Ada"))
}

/// Mock receiver answering `status` on `POST {route}`.
pub async fn create_mock_receiver(route: &str, status: u16) -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"ok": status < 300})))
        .mount(&mock_server)
        .await;

    mock_server
}
