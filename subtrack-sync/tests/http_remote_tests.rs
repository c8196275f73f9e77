use subtrack_sync::remote::RemoteService;
use subtrack_sync::{HttpRemote, HttpRemoteConfig, RemoteError};
use subtrack_types::{Collection, OwnerId, RecordId};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_for(server: &MockServer) -> HttpRemote {
    HttpRemote::new(HttpRemoteConfig {
        base_url: server.uri(),
        bearer_token: None,
        request_timeout_secs: 5,
    })
}

#[tokio::test]
async fn create_sends_correlation_id_and_decodes_record() {
    let server = MockServer::start().await;
    let owner = OwnerId::new();
    let correlation = RecordId::temporary();
    let payload = serde_json::json!({ "name": "Netflix", "price": 15.99 });

    Mock::given(method("POST"))
        .and(path("/v1/subscriptions"))
        .and(header("Idempotency-Key", correlation.as_str()))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "srv-1",
            "ownerId": owner.to_string(),
            "payload": { "name": "Netflix", "price": 15.99 },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = remote_for(&server)
        .create_entity(Collection::Subscriptions, &correlation, &payload)
        .await
        .unwrap();

    assert_eq!(record.id, RecordId::new("srv-1"));
    assert_eq!(record.owner_id, owner);
    assert_eq!(record.payload["name"], serde_json::json!("Netflix"));
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/subscriptions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = remote_for(&server)
        .create_entity(
            Collection::Subscriptions,
            &RecordId::temporary(),
            &serde_json::json!({}),
        )
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn rate_limiting_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/subscriptions/sub-1"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = remote_for(&server)
        .update_entity(
            Collection::Subscriptions,
            &RecordId::new("sub-1"),
            &serde_json::json!({}),
        )
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn validation_rejections_are_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/subscriptions/sub-1"))
        .respond_with(ResponseTemplate::new(422).set_body_string("price must be positive"))
        .mount(&server)
        .await;

    let err = remote_for(&server)
        .update_entity(
            Collection::Subscriptions,
            &RecordId::new("sub-1"),
            &serde_json::json!({ "price": -1 }),
        )
        .await
        .unwrap_err();

    match err {
        RemoteError::Terminal(message) => {
            assert!(message.starts_with("422"));
            assert!(message.contains("price must be positive"));
        }
        RemoteError::Transient(message) => panic!("expected terminal, got transient: {message}"),
    }
}

#[tokio::test]
async fn deleting_a_missing_entity_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/subscriptions/sub-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    remote_for(&server)
        .delete_entity(Collection::Subscriptions, &RecordId::new("sub-1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn marking_a_missing_notification_read_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/notifications/notif-1/read"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    remote_for(&server)
        .mark_read(&RecordId::new("notif-1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn update_without_body_confirms_with_none() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/subscriptions/sub-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let echoed = remote_for(&server)
        .update_entity(
            Collection::Subscriptions,
            &RecordId::new("sub-1"),
            &serde_json::json!({ "name": "Spotify" }),
        )
        .await
        .unwrap();

    assert!(echoed.is_none());
}

#[tokio::test]
async fn update_echoing_a_record_returns_it() {
    let server = MockServer::start().await;
    let owner = OwnerId::new();
    Mock::given(method("PUT"))
        .and(path("/v1/owners/".to_string() + &owner.to_string() + "/preferences"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "prefs-1",
            "ownerId": owner.to_string(),
            "payload": { "currency": "EUR" },
        })))
        .mount(&server)
        .await;

    let echoed = remote_for(&server)
        .update_preferences(&owner, &serde_json::json!({ "currency": "EUR" }))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(echoed.id, RecordId::new("prefs-1"));
    assert_eq!(echoed.payload["currency"], serde_json::json!("EUR"));
}

#[tokio::test]
async fn fetch_all_scopes_by_owner() {
    let server = MockServer::start().await;
    let owner = OwnerId::new();
    Mock::given(method("GET"))
        .and(path("/v1/notifications"))
        .and(query_param("owner", owner.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": "n-1", "ownerId": owner.to_string(), "payload": { "read": false } },
            { "id": "n-2", "ownerId": owner.to_string(), "payload": { "read": true } },
        ])))
        .mount(&server)
        .await;

    let records = remote_for(&server)
        .fetch_all(Collection::Notifications, &owner)
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, RecordId::new("n-1"));
}

#[tokio::test]
async fn bearer_token_is_attached_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/subscriptions/sub-1"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let remote = HttpRemote::new(HttpRemoteConfig {
        base_url: server.uri(),
        bearer_token: Some("secret-token".to_string()),
        request_timeout_secs: 5,
    });
    remote
        .delete_entity(Collection::Subscriptions, &RecordId::new("sub-1"))
        .await
        .unwrap();
}
