//! Arduino Connector Integration Tests
//!
//! Token exchange, property polling and failure handling against a
//! `wiremock` stand-in for the Arduino IoT Cloud API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::time::Duration;

use inflatacare_core::PropertyName;
use inflatacare_relay::{
    ArduinoClientConfig, ArduinoCloudConnector, CloudConnector, CloudError, CloudEvent,
    CloudSession, Credentials,
};
use serde_json::json;
use tokio::time::timeout;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const THING: &str = "thing-1";
const PROPERTIES_PATH: &str = "/iot/v2/things/thing-1/properties";
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

fn connector(server: &MockServer) -> ArduinoCloudConnector {
    ArduinoCloudConnector::new(ArduinoClientConfig {
        api_url: server.uri(),
        credentials: Credentials::new("client-1".into(), "secret-1".into()),
        poll_interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap()
}

async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/iot/v1/clients/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": token, "expires_in": 300})),
        )
        .mount(server)
        .await;
}

fn property(variable: &str, value: f64, updated_at: &str) -> serde_json::Value {
    json!({
        "id": format!("id-{variable}"),
        "name": variable,
        "variable_name": variable,
        "last_value": value,
        "value_updated_at": updated_at,
    })
}

async fn next_value(session: &mut CloudSession) -> (String, f64) {
    match timeout(EVENT_TIMEOUT, session.next_event()).await.unwrap() {
        Some(CloudEvent::PropertyValue { property, value }) => (property, value),
        other => panic!("expected a property value, got {other:?}"),
    }
}

// ── Connect ─────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_emits_initial_values() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path(PROPERTIES_PATH))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property("fRS1", 12.5, "2025-03-01T10:00:00Z"),
            property("alertStatus", 0.0, "2025-03-01T10:00:00Z"),
            property("batteryLevel", 80.0, "2025-03-01T10:00:00Z"),
        ])))
        .mount(&server)
        .await;

    let mut session = connector(&server)
        .connect(THING, &PropertyName::ALL)
        .await
        .unwrap();

    assert_eq!(next_value(&mut session).await, ("fRS1".into(), 12.5));
    assert_eq!(next_value(&mut session).await, ("alertStatus".into(), 0.0));
}

#[tokio::test]
async fn rejected_credentials_fail_connect() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/iot/v1/clients/token"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "invalid_client", "detail": "bad secret"})),
        )
        .mount(&server)
        .await;

    let result = connector(&server).connect(THING, &PropertyName::ALL).await;
    assert!(
        matches!(&result, Err(CloudError::Auth(detail)) if detail.contains("bad secret")),
        "expected Auth error, got: {:?}",
        result.err()
    );
}

#[tokio::test]
async fn unknown_thing_fails_connect_with_status() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path(PROPERTIES_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "thing not found"})))
        .mount(&server)
        .await;

    let result = connector(&server).connect(THING, &PropertyName::ALL).await;
    assert_eq!(
        result.err(),
        Some(CloudError::Status {
            status: 404,
            body: "thing not found".into()
        })
    );
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn poll_emits_only_newer_readings() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path(PROPERTIES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property("fRS1", 1.0, "2025-03-01T10:00:00Z"),
            property("fRS2", 2.0, "2025-03-01T10:00:00Z"),
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROPERTIES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property("fRS1", 1.0, "2025-03-01T10:00:00Z"),
            property("fRS2", 2.75, "2025-03-01T10:00:01Z"),
        ])))
        .mount(&server)
        .await;

    let mut session = connector(&server)
        .connect(THING, &PropertyName::ALL)
        .await
        .unwrap();

    assert_eq!(next_value(&mut session).await, ("fRS1".into(), 1.0));
    assert_eq!(next_value(&mut session).await, ("fRS2".into(), 2.0));
    assert_eq!(next_value(&mut session).await, ("fRS2".into(), 2.75));
}

#[tokio::test]
async fn expired_token_is_refreshed_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/iot/v1/clients/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1", "expires_in": 300})),
        )
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROPERTIES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property("fRS3", 3.0, "2025-03-01T10:00:00Z"),
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROPERTIES_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "token expired"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROPERTIES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property("fRS3", 3.5, "2025-03-01T10:00:05Z"),
        ])))
        .mount(&server)
        .await;

    let mut session = connector(&server)
        .connect(THING, &PropertyName::ALL)
        .await
        .unwrap();

    assert_eq!(next_value(&mut session).await, ("fRS3".into(), 3.0));
    assert_eq!(next_value(&mut session).await, ("fRS3".into(), 3.5));

    drop(session);
    server.verify().await;
}

#[tokio::test]
async fn poll_failure_ends_session_with_disconnect() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path(PROPERTIES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property("fRS4", 4.0, "2025-03-01T10:00:00Z"),
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROPERTIES_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let mut session = connector(&server)
        .connect(THING, &PropertyName::ALL)
        .await
        .unwrap();

    assert_eq!(next_value(&mut session).await, ("fRS4".into(), 4.0));

    match timeout(EVENT_TIMEOUT, session.next_event()).await.unwrap() {
        Some(CloudEvent::Disconnected { reason }) => {
            assert!(reason.contains("503"), "reason: {reason}");
        }
        other => panic!("expected disconnect, got {other:?}"),
    }
    assert!(session.next_event().await.is_none());
}
