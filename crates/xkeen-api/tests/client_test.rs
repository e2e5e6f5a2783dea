// Integration tests for `ApiClient` using wiremock.

use std::sync::Arc;

use futures_util::StreamExt;
use secrecy::ExposeSecret;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xkeen_api::models::{Latency, Protocol};
use xkeen_api::{ApiClient, CredentialStore, Error, MemoryCredentialStore, SseEvent, StreamEndpoint};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(token: Option<&str>) -> (MockServer, ApiClient, Arc<MemoryCredentialStore>) {
    let server = MockServer::start().await;
    let store = Arc::new(match token {
        Some(t) => MemoryCredentialStore::with_token(t),
        None => MemoryCredentialStore::new(),
    });
    let client = ApiClient::from_reqwest(&server.uri(), reqwest::Client::new(), store.clone()).unwrap();
    (server, client, store)
}

fn server_json(id: u32, active: bool, latency: i64) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("srv-{id}"),
        "address": format!("{id}.example.net"),
        "port": 443,
        "protocol": "vless",
        "active": active,
        "latency_ms": latency
    })
}

// ── Queries ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_status_sends_bearer_token() {
    let (server, client, _) = setup(Some("tok-1")).await;

    Mock::given(method("GET"))
        .and(path("/api/status"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "connected": true,
            "xray_running": true,
            "restarting": false,
            "current_server": "srv-2",
            "protocol": "vless",
            "latency_ms": 120,
            "uptime": "3h 12m",
            "last_check": "2025-03-01T12:00:00Z",
            "watchdog_active": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = client.status().await.unwrap();
    assert!(status.connected);
    assert!(status.daemon_running);
    assert_eq!(status.latency_ms, Latency::from_millis(120));
    assert_eq!(status.current_server, "srv-2");
}

#[tokio::test]
async fn test_servers_null_is_empty() {
    let (server, client, _) = setup(Some("t")).await;

    Mock::given(method("GET"))
        .and(path("/api/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "servers": null })))
        .mount(&server)
        .await;

    assert!(client.servers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_servers_decode() {
    let (server, client, _) = setup(Some("t")).await;

    Mock::given(method("GET"))
        .and(path("/api/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "servers": [server_json(1, true, 80), server_json(2, false, -1)]
        })))
        .mount(&server)
        .await;

    let servers = client.servers().await.unwrap();
    assert_eq!(servers.len(), 2);
    assert!(servers[0].active);
    assert_eq!(servers[0].protocol, Protocol::Vless);
    assert!(!servers[1].latency_ms.is_measured());
}

#[tokio::test]
async fn test_logs_passes_line_count() {
    let (server, client, _) = setup(Some("t")).await;

    Mock::given(method("GET"))
        .and(path("/api/logs"))
        .and(query_param("lines", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lines": ["a", "b"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.logs(50).await.unwrap(), vec!["a", "b"]);
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_select_server_posts_id() {
    let (server, client, _) = setup(Some("t")).await;

    Mock::given(method("POST"))
        .and(path("/api/servers/select"))
        .and(body_json(json!({ "id": 3 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "server": server_json(3, true, -1),
            "restarting": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.select_server(3).await.unwrap();
    assert_eq!(resp.server.id, 3);
    assert!(resp.restarting);
}

#[tokio::test]
async fn test_toggle_watchdog() {
    let (server, client, _) = setup(Some("t")).await;

    Mock::given(method("POST"))
        .and(path("/api/watchdog/toggle"))
        .and(body_json(json!({ "active": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "active": false })))
        .mount(&server)
        .await;

    assert!(!client.toggle_watchdog(false).await.unwrap().active);
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_401_clears_credential() {
    let (server, client, store) = setup(Some("expired")).await;

    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "unauthorized" })))
        .mount(&server)
        .await;

    let err = client.status().await.unwrap_err();
    assert!(matches!(err, Error::SessionExpired));
    assert!(!store.is_present());
}

#[tokio::test]
async fn test_error_body_message() {
    let (server, client, store) = setup(Some("t")).await;

    Mock::given(method("POST"))
        .and(path("/api/servers/select"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "сервер с ID 9 не найден"
        })))
        .mount(&server)
        .await;

    match client.select_server(9).await.unwrap_err() {
        Error::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "сервер с ID 9 не найден");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(store.is_present());
}

#[tokio::test]
async fn test_error_without_body_uses_status_text() {
    let (server, client, _) = setup(Some("t")).await;

    Mock::given(method("POST"))
        .and(path("/api/xkeen/restart"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client.restart_daemon().await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 500, ref message } if message == "Internal Server Error"));
    assert!(err.is_transient());
}

// ── Auth ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_stores_token() {
    let (server, client, store) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({
            "username": "admin",
            "password": "hunter22",
            "totp_code": "123456"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "jwt-abc" })))
        .mount(&server)
        .await;

    client.login("admin", "hunter22", "123456").await.unwrap();
    assert_eq!(store.token().unwrap().expose_secret(), "jwt-abc");
}

#[tokio::test]
async fn test_login_rejected_is_authentication_error() {
    let (server, client, store) = setup(Some("old")).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "неверный TOTP-код"
        })))
        .mount(&server)
        .await;

    let err = client.login("admin", "hunter22", "000000").await.unwrap_err();
    assert!(matches!(err, Error::Authentication { ref message } if message == "неверный TOTP-код"));
    assert!(store.is_present());
}

#[tokio::test]
async fn test_auth_status_needs_no_token() {
    let (server, client, _) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/api/auth/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "setup_required": false })))
        .mount(&server)
        .await;

    assert!(!client.auth_status().await.unwrap().setup_required);
}

#[tokio::test]
async fn test_setup_returns_totp_secret() {
    let (server, client, store) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/setup"))
        .and(body_json(json!({ "username": "admin", "password": "hunter2222" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totp_secret": "JBSWY3DPEHPK3PXP",
            "totp_qr": "iVBORw0KGgo="
        })))
        .expect(1)
        .mount(&server)
        .await;

    let enrollment = client.setup("admin", "hunter2222").await.unwrap();
    assert_eq!(enrollment.totp_secret.expose_secret(), "JBSWY3DPEHPK3PXP");
    assert!(!store.is_present());
}

#[tokio::test]
async fn test_setup_on_configured_panel_is_api_error() {
    let (server, client, _) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/setup"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "пользователь уже настроен"
        })))
        .mount(&server)
        .await;

    let err = client.setup("admin", "hunter2222").await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 400, .. }));
}

#[tokio::test]
async fn test_setup_confirm_stores_token() {
    let (server, client, store) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/setup/confirm"))
        .and(body_json(json!({ "code": "654321" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "jwt-first" })))
        .mount(&server)
        .await;

    client.setup_confirm("654321").await.unwrap();
    assert_eq!(store.token().unwrap().expose_secret(), "jwt-first");
}

#[tokio::test]
async fn test_setup_confirm_wrong_code_is_authentication_error() {
    let (server, client, store) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/setup/confirm"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "неверный TOTP-код"
        })))
        .mount(&server)
        .await;

    let err = client.setup_confirm("000000").await.unwrap_err();
    assert!(matches!(err, Error::Authentication { ref message } if message == "неверный TOTP-код"));
    assert!(!store.is_present());
}

// ── Event streams ───────────────────────────────────────────────────

#[tokio::test]
async fn test_event_stream_decodes_frames() {
    let (server, client, _) = setup(Some("tok-9")).await;

    let body = "event: status\ndata: {\"connected\":true}\n\nevent: log\ndata: xray started\n\n";
    Mock::given(method("GET"))
        .and(path("/api/events"))
        .and(query_param("token", "tok-9"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stream = client.open_event_stream(StreamEndpoint::Events).await.unwrap();
    let events: Vec<SseEvent> = stream.map(Result::unwrap).collect().await;
    assert_eq!(
        events,
        vec![
            SseEvent::new("status", "{\"connected\":true}"),
            SseEvent::new("log", "xray started"),
        ]
    );
}

#[tokio::test]
async fn test_event_stream_requires_credential() {
    let (_server, client, _) = setup(None).await;
    let err = client
        .open_event_stream(StreamEndpoint::LatencyCheck)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::NoCredential));
}

#[tokio::test]
async fn test_event_stream_401_clears_credential() {
    let (server, client, store) = setup(Some("stale")).await;

    Mock::given(method("GET"))
        .and(path("/api/servers/check"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client
        .open_event_stream(StreamEndpoint::LatencyCheck)
        .await
        .err()
        .unwrap();
    assert!(err.is_auth_expired());
    assert!(!store.is_present());
}
